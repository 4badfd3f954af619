//! UseCase 層
//!
//! ルームへのコマンド、プレゼンス管理、合意検出、紙吹雪イベントと、
//! それらを 1 参加者分にまとめるセッションを提供します。
//! ストアへのアクセスはすべてドメイン層の `RealtimeStore` trait を通します。

pub mod celebration;
pub mod consensus;
pub mod error;
pub mod lobby;
pub mod presence;
pub mod room_commands;
pub mod room_watcher;
pub mod session;

pub use celebration::{CONFETTI_LIFETIME, CelebrationBus, CelebrationFeed, SEEN_CONFETTI_CAPACITY};
pub use consensus::{Consensus, ConsensusDetector};
pub use error::{CommandOutcome, CommandSkip, SessionError};
pub use lobby::RoomLobby;
pub use presence::PresenceTracker;
pub use room_commands::RoomCommands;
pub use room_watcher::{RoomSnapshot, RoomWatcher};
pub use session::{Celebration, RoomSession, SessionEvent, SessionOptions};
