//! Utilities shared by the hanabi packages.

pub mod logger;
pub mod time;
