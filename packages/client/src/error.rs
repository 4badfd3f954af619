//! Error types for the Hanabi client.

use hanabi_core::domain::ValueObjectError;
use hanabi_core::usecase::SessionError;
use thiserror::Error;

/// Client-specific errors
#[derive(Debug, Error)]
pub enum ClientError {
    /// Connection error
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// The store connection could not be restored
    #[error("Connection lost after {0} reconnect attempts")]
    ReconnectExhausted(u32),

    #[error(transparent)]
    Session(#[from] SessionError),

    /// A command line argument did not pass validation
    #[error("Invalid argument: {0}")]
    InvalidArgument(#[from] ValueObjectError),
}
