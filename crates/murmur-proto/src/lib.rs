//! Wire protocol for the Murmur real-time sync engine.
//!
//! Every frame on a channel is a JSON envelope of the form
//! `{ "type": <string>, "payload"?: <object> }`. Outbound frames (client to
//! server) and inbound frames (server to client) are separate enums so a
//! client can never accidentally emit a server-only frame.
//!
//! # Components
//!
//! - [`ChannelAddress`]: Identifies the global channel or a per-room channel
//! - [`OutboundFrame`] / [`InboundFrame`]: Typed envelopes
//! - [`PresenceRecord`], [`MessageRecord`], [`Notification`]: Wire records
//! - [`HistoryPage`]: One page of the REST history endpoint

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod address;
pub mod errors;
pub mod frame;
pub mod records;

pub use address::{ChannelAddress, RoomKey};
pub use errors::{ProtocolError, Result};
pub use frame::{InboundFrame, OutboundFrame, decode, encode};
pub use records::{
    HistoryPage, MessageId, MessageKind, MessageRecord, Notification, PresenceRecord,
    PresenceStatus, RoomId, UserId, WorkspaceId,
};
