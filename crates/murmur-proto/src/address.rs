//! Channel addressing.
//!
//! A client holds at most one channel per address: the global channel carries
//! presence and notifications, and each (workspace, room) pair has its own
//! chat channel.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::records::{RoomId, WorkspaceId};

/// Path of the global presence/notification channel.
pub const GLOBAL_PATH: &str = "/ws/global";

/// A chat room inside a workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RoomKey {
    /// Owning workspace
    pub workspace_id: WorkspaceId,
    /// Room within the workspace
    pub room_id: RoomId,
}

impl RoomKey {
    /// Create a room key.
    pub fn new(workspace_id: WorkspaceId, room_id: RoomId) -> Self {
        Self { workspace_id, room_id }
    }
}

impl fmt::Display for RoomKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.workspace_id, self.room_id)
    }
}

/// Logical address of a bidirectional channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ChannelAddress {
    /// Global channel for presence and notifications
    Global,
    /// Per-room chat channel
    Room(RoomKey),
}

impl ChannelAddress {
    /// Channel address for a room.
    pub fn room(workspace_id: WorkspaceId, room_id: RoomId) -> Self {
        Self::Room(RoomKey::new(workspace_id, room_id))
    }

    /// Path component joined onto the WebSocket base URL.
    pub fn path(&self) -> String {
        match self {
            Self::Global => GLOBAL_PATH.to_string(),
            Self::Room(key) => {
                format!("/ws/workspaces/{}/rooms/{}", key.workspace_id, key.room_id)
            },
        }
    }

    /// Full URL for this address under `base` (e.g. `wss://host`).
    pub fn url(&self, base: &str) -> String {
        format!("{}{}", base.trim_end_matches('/'), self.path())
    }

    /// Room key, if this is a room channel.
    pub fn room_key(&self) -> Option<RoomKey> {
        match self {
            Self::Global => None,
            Self::Room(key) => Some(*key),
        }
    }
}

impl fmt::Display for ChannelAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Global => f.write_str("global"),
            Self::Room(key) => write!(f, "room:{key}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_path_is_fixed() {
        assert_eq!(ChannelAddress::Global.path(), "/ws/global");
    }

    #[test]
    fn room_path_includes_workspace_and_room() {
        let address = ChannelAddress::room(7, 42);
        assert_eq!(address.path(), "/ws/workspaces/7/rooms/42");
        assert_eq!(address.room_key(), Some(RoomKey::new(7, 42)));
    }

    #[test]
    fn url_joins_without_double_slash() {
        let address = ChannelAddress::Global;
        assert_eq!(address.url("wss://chat.example/"), "wss://chat.example/ws/global");
        assert_eq!(address.url("wss://chat.example"), "wss://chat.example/ws/global");
    }

    #[test]
    fn distinct_rooms_are_distinct_addresses() {
        assert_ne!(ChannelAddress::room(1, 2), ChannelAddress::room(2, 1));
        assert_ne!(ChannelAddress::room(1, 2), ChannelAddress::Global);
    }
}
