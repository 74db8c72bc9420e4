//! Typed channel envelopes.
//!
//! The envelope is adjacently tagged: the variant name lands in `type` and its
//! fields in `payload`. Variants without fields omit `payload` entirely.
//!
//! # Invariants
//!
//! - Every outbound variant maps to exactly one wire `type`.
//! - Decoding rejects unknown `type` values rather than guessing.

use std::collections::HashMap;

use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{
    errors::Result,
    records::{MessageRecord, Notification, PresenceRecord, PresenceStatus, UserId},
};

/// Frames a client sends to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum OutboundFrame {
    /// Keep-alive
    Heartbeat,

    /// Watch presence of these users
    SubscribePresence {
        /// Users to watch
        user_ids: Vec<UserId>,
    },

    /// Change own presence status
    ChangeStatus {
        /// New status
        status: PresenceStatus,
    },

    /// Change own custom status
    ChangeStatusMessage {
        /// Status text; `None` clears it
        text: Option<String>,
        /// Status emoji; `None` clears it
        emoji: Option<String>,
    },

    /// Post a chat message
    Message {
        /// Body text
        message: String,
        /// Correlation reference the server echoes back on the confirmed
        /// message
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_ref: Option<u64>,
    },

    /// Local user started typing
    Typing,

    /// Local user stopped typing
    StopTyping,
}

impl OutboundFrame {
    /// Wire `type` of this frame.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Heartbeat => "heartbeat",
            Self::SubscribePresence { .. } => "subscribe_presence",
            Self::ChangeStatus { .. } => "change_status",
            Self::ChangeStatusMessage { .. } => "change_status_message",
            Self::Message { .. } => "message",
            Self::Typing => "typing",
            Self::StopTyping => "stop_typing",
        }
    }

    /// Encode to envelope JSON.
    pub fn to_json(&self) -> Result<String> {
        encode(self)
    }
}

/// Frames the server pushes to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum InboundFrame {
    /// Full record for a single user
    PresenceUpdate(PresenceRecord),

    /// Batch of records keyed by user id
    PresenceStateSync(HashMap<UserId, PresenceRecord>),

    /// Notification for the current user
    Notification(Notification),

    /// Chat message (confirmed, server-assigned id)
    Message(MessageRecord),

    /// Another user started typing
    Typing {
        /// Typing user
        user_id: UserId,
        /// Display name
        #[serde(default)]
        nickname: String,
    },

    /// Another user stopped typing
    StopTyping {
        /// User who stopped
        user_id: UserId,
    },
}

impl InboundFrame {
    /// Decode from envelope JSON.
    pub fn from_json(text: &str) -> Result<Self> {
        decode(text)
    }
}

/// Serialize any frame to envelope JSON.
pub fn encode<T: Serialize>(frame: &T) -> Result<String> {
    Ok(serde_json::to_string(frame)?)
}

/// Parse envelope JSON into a frame.
pub fn decode<T: DeserializeOwned>(text: &str) -> Result<T> {
    Ok(serde_json::from_str(text)?)
}
