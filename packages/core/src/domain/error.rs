//! Domain errors.

use thiserror::Error;

/// Value object validation errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValueObjectError {
    #[error("{kind} must not be empty")]
    EmptyId { kind: &'static str },

    #[error("{kind} must be at most {max} characters, got {found}")]
    IdTooLong {
        kind: &'static str,
        max: usize,
        found: usize,
    },

    #[error("{kind} contains forbidden character '{ch}'")]
    ForbiddenCharacter { kind: &'static str, ch: char },

    #[error("name must not be empty")]
    EmptyName,

    #[error("name must be at most {max} characters, got {found}")]
    NameTooLong { max: usize, found: usize },

    #[error("'{0}' is not a card of the deck")]
    UnknownCard(String),
}

/// Realtime store errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The connection to the store is down
    #[error("store is unavailable")]
    Unavailable,

    #[error("invalid store path '{0}'")]
    InvalidPath(String),

    #[error("failed to encode value: {0}")]
    Encoding(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Encoding(e.to_string())
    }
}
