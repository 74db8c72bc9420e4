//! Error types for the channel layer.
//!
//! Transport failures are never errors here: they are close events handled by
//! reconnecting. What remains is misuse of the registry by its owner.

use murmur_proto::ChannelAddress;
use thiserror::Error;

/// Errors from channel registry operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// Address has no live connection in the registry
    #[error("no channel registered for {0}")]
    UnknownAddress(ChannelAddress),
}
