//! Murmur sync client.
//!
//! Action-based sync engine for chat, presence and notifications. Keeps a
//! client's view of messages, typing state and user presence consistent with
//! the server across an unreliable bidirectional channel.
//!
//! Like [`murmur_core`], nothing here performs I/O by default. Feed
//! [`SyncEvent`]s to the engine and execute the [`SyncAction`]s it returns.
//!
//! # Components
//!
//! - [`SyncEngine`]: Top-level state machine owning every component
//! - [`PresenceSync`]: Presence map, watch-set and idle detection
//! - [`ChatSync`]: Message list, optimistic sends, pagination, typing
//! - [`NotificationRelay`]: De-duplicated notification feed
//! - [`RestApi`]: The request/response collaborator
//!
//! The `transport` feature adds the tokio side:
//! - [`transport`]: WebSocket channel tasks
//! - [`http::HttpApi`]: `reqwest`-backed [`RestApi`]
//! - [`runtime::Runtime`]: tokio event loop driving a [`SyncEngine`]

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod chat;
mod engine;
mod error;
mod event;
mod idle;
mod notifications;
mod presence;
mod rest;
mod typing;

#[cfg(feature = "transport")]
pub mod http;
#[cfg(feature = "transport")]
pub mod runtime;
#[cfg(feature = "transport")]
pub mod system_env;
#[cfg(feature = "transport")]
pub mod transport;

pub use chat::{ChatConfig, ChatEffect, ChatMessage, ChatSync, Provenance, SenderInfo};
pub use engine::{Identity, SyncConfig, SyncEngine};
pub use error::{ApiError, SyncError};
pub use event::{HistoryRequest, LoadKind, PostRequest, SyncAction, SyncEvent};
pub use idle::{ActivityState, IdleDetector};
pub use murmur_core::env::Environment;
pub use notifications::NotificationRelay;
pub use presence::{PresenceConfig, PresenceSync};
pub use rest::RestApi;
pub use typing::{OutgoingTyping, TypingIndicatorSet};
