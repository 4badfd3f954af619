//! Realtime store host for Hanabi.
//!
//! Every WebSocket connection gets its own connection to one shared in-memory
//! store. Closing the socket fires that client's disconnect hooks, which is how
//! presence flips to offline without any explicit client action.

// layers
pub mod ui;
pub mod usecase;
