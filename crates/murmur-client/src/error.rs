//! Client error types.

use murmur_core::ChannelError;
use murmur_proto::ProtocolError;
use thiserror::Error;

/// Errors from [`crate::SyncEngine::handle`].
///
/// Channel failures never show up here; they are close events. These are
/// programming errors or frames that could not be encoded.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// Channel registry misuse
    #[error(transparent)]
    Channel(#[from] ChannelError),

    /// Outbound frame could not be encoded
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Errors from the REST collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// Request never produced a response (DNS, connect, timeout)
    #[error("request failed: {0}")]
    Http(String),

    /// Server answered with a non-success status
    #[error("server returned {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body, possibly truncated
        body: String,
    },

    /// Response body did not match the expected shape
    #[error("invalid response body: {0}")]
    Decode(String),
}
