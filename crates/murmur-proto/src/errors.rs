//! Protocol error types.

use thiserror::Error;

/// Result alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors produced while encoding or decoding channel frames.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Frame could not be serialized to JSON
    #[error("failed to encode frame: {0}")]
    Encode(String),

    /// Frame text is not a valid envelope, or its type is unknown
    #[error("malformed frame: {0}")]
    Malformed(String),
}

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_io() { Self::Encode(err.to_string()) } else { Self::Malformed(err.to_string()) }
    }
}
