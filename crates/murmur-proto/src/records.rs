//! Records carried inside frames and REST responses.
//!
//! Timestamps are Unix milliseconds. Server-assigned message ids are small and
//! monotonic; optimistic ids minted by clients live far above that range.

use std::fmt;

use serde::{Deserialize, Serialize};

/// User identifier.
pub type UserId = u64;

/// Workspace identifier.
pub type WorkspaceId = u64;

/// Room identifier (unique within a workspace).
pub type RoomId = u64;

/// Message identifier.
pub type MessageId = u64;

/// Presence status of a user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    /// Connected and active
    Online,
    /// Connected but inactive
    Idle,
    /// Do not disturb
    Dnd,
    /// Not connected, or unknown
    #[default]
    Offline,
}

impl PresenceStatus {
    /// Wire name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Idle => "idle",
            Self::Dnd => "dnd",
            Self::Offline => "offline",
        }
    }
}

impl fmt::Display for PresenceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PresenceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "online" => Ok(Self::Online),
            "idle" => Ok(Self::Idle),
            "dnd" => Ok(Self::Dnd),
            "offline" => Ok(Self::Offline),
            other => Err(format!("unknown presence status: {other}")),
        }
    }
}

/// Presence of one user as reported by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceRecord {
    /// User this record describes
    pub user_id: UserId,
    /// Current status
    pub status: PresenceStatus,
    /// Last heartbeat seen by the server (Unix millis)
    pub last_heartbeat: i64,
    /// Custom status text
    #[serde(default)]
    pub status_message: Option<String>,
    /// Custom status emoji
    #[serde(default)]
    pub status_emoji: Option<String>,
}

/// Kind of chat message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Plain text
    #[default]
    Text,
    /// Anything else (files, system events, ...)
    #[serde(other)]
    Other,
}

/// A chat message as delivered by the server, over the channel or REST.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    /// Server-assigned id
    pub id: MessageId,
    /// Room the message belongs to
    #[serde(default)]
    pub room_id: Option<RoomId>,
    /// Sender; absent for system messages
    #[serde(default)]
    pub sender_id: Option<UserId>,
    /// Sender display name
    #[serde(default)]
    pub nickname: Option<String>,
    /// Sender avatar URL
    #[serde(default)]
    pub avatar: Option<String>,
    /// Body text
    pub message: String,
    /// Message kind
    #[serde(default, rename = "type")]
    pub kind: MessageKind,
    /// Creation time (Unix millis)
    pub created_at: i64,
    /// Correlation reference echoed from the sender's outbound frame
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_ref: Option<u64>,
}

/// A user-facing notification pushed on the global channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Notification id, unique per user
    pub id: u64,
    /// Category (e.g. `mention`, `invite`)
    #[serde(default)]
    pub kind: String,
    /// Short title
    pub title: String,
    /// Optional longer body
    #[serde(default)]
    pub body: Option<String>,
    /// Creation time (Unix millis)
    pub created_at: i64,
    /// Opaque payload for the UI
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// One page of message history, in ascending order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryPage {
    /// Messages, oldest first
    pub messages: Vec<MessageRecord>,
    /// Total number of messages in the room
    pub total: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_uses_lowercase_wire_names() {
        let json = serde_json::to_string(&PresenceStatus::Dnd).unwrap();
        assert_eq!(json, "\"dnd\"");

        let parsed: PresenceStatus = serde_json::from_str("\"idle\"").unwrap();
        assert_eq!(parsed, PresenceStatus::Idle);
    }

    #[test]
    fn status_parses_from_str() {
        assert_eq!("online".parse::<PresenceStatus>(), Ok(PresenceStatus::Online));
        assert!("away".parse::<PresenceStatus>().is_err());
    }

    #[test]
    fn message_defaults_optional_fields() {
        let json = r#"{"id":3,"message":"hi","created_at":10}"#;
        let record: MessageRecord = serde_json::from_str(json).unwrap();

        assert_eq!(record.sender_id, None);
        assert_eq!(record.kind, MessageKind::Text);
        assert_eq!(record.client_ref, None);
    }

    #[test]
    fn unknown_message_kind_maps_to_other() {
        let json = r#"{"id":3,"message":"a.png","type":"file","created_at":10}"#;
        let record: MessageRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.kind, MessageKind::Other);
    }

    #[test]
    fn presence_record_without_custom_status() {
        let json = r#"{"user_id":9,"status":"online","last_heartbeat":1700000000000}"#;
        let record: PresenceRecord = serde_json::from_str(json).unwrap();

        assert_eq!(record.user_id, 9);
        assert_eq!(record.status_message, None);
        assert_eq!(record.status_emoji, None);
    }
}
