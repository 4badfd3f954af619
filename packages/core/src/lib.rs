//! Planning poker room core.
//!
//! Every participant's client shares one room document in a realtime store.
//! This library provides the room model, the commands that mutate it, presence
//! tracking on top of disconnect hooks, consensus detection at reveal time and
//! the ephemeral celebration channel.

// layers
pub mod domain;
pub mod infrastructure;
pub mod usecase;
