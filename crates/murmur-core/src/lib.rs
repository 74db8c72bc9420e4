//! Core channel logic for the Murmur sync engine.
//!
//! Pure state machines with no I/O. Methods take time as input and return
//! actions for a driver to execute, so the same code runs under a tokio
//! runtime in production and under a virtual clock in simulation.
//!
//! # Components
//!
//! - [`env::Environment`]: Time and randomness abstraction
//! - [`ChannelConnection`]: Lifecycle of one bidirectional channel
//! - [`Backoff`]: Reconnect delay policy
//! - [`ChannelRegistry`]: One connection per address, reference counted

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod backoff;
pub mod connection;
pub mod env;
pub mod error;
pub mod registry;

pub use backoff::Backoff;
pub use connection::{ChannelAction, ChannelConnection, ChannelState, ConnectionConfig};
pub use env::Environment;
pub use error::ChannelError;
pub use registry::ChannelRegistry;
