//! Plain-data copies of engine state.
//!
//! Checks read a snapshot instead of the engine so every check in a pass sees
//! the same state. Snapshots serialize to JSON for `insta`.

use murmur_client::SyncEngine;
use murmur_core::env::Environment;
use murmur_proto::{MessageId, UserId};
use serde::Serialize;

/// Every simulated client at one instant.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SystemSnapshot {
    /// One entry per engine
    pub clients: Vec<ClientSnapshot>,
}

impl SystemSnapshot {
    /// No clients.
    pub fn empty() -> Self {
        Self::default()
    }

    /// One client.
    pub fn single(client: ClientSnapshot) -> Self {
        Self { clients: vec![client] }
    }
}

/// What one engine's UI could observe.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ClientSnapshot {
    /// Local user.
    pub user_id: UserId,
    /// Active room as `workspace/room`. `None` outside a room.
    pub active_room: Option<String>,
    /// Message list, oldest first.
    pub messages: Vec<MessageSnapshot>,
    /// Users shown as typing.
    pub typing: Vec<UserId>,
    /// Live channels, ordered by address.
    pub channels: Vec<ChannelSnapshot>,
    /// Presence watch-set.
    pub watched: Vec<UserId>,
    /// Notification ids, newest first.
    pub notifications: Vec<u64>,
}

impl ClientSnapshot {
    /// Create an empty snapshot for `user_id`.
    pub fn new(user_id: UserId) -> Self {
        Self { user_id, ..Default::default() }
    }

    /// Capture the observable state of `engine`.
    pub fn from_engine<E: Environment>(engine: &SyncEngine<E>) -> Self {
        let chat = engine.chat();

        let mut channels: Vec<_> = engine
            .channels()
            .connections()
            .map(|conn| (conn.address(), ChannelSnapshot {
                address: conn.address().to_string(),
                room: conn.address().room_key().map(|room| room.to_string()),
                state: format!("{:?}", conn.state()),
                heartbeat_armed: conn.heartbeat_armed(),
                reconnect_armed: conn.reconnect_armed(),
            }))
            .collect();
        channels.sort_by_key(|(address, _)| *address);

        Self {
            user_id: engine.identity().user_id,
            active_room: chat.room().map(|room| room.to_string()),
            messages: chat
                .messages()
                .iter()
                .map(|m| MessageSnapshot {
                    id: m.id,
                    sender_id: m.sender_id,
                    body: m.body.clone(),
                    client_ref: m.client_ref(),
                })
                .collect(),
            typing: chat.typing().iter().map(|(id, _)| id).collect(),
            channels: channels.into_iter().map(|(_, channel)| channel).collect(),
            watched: engine.presence().watched().collect(),
            notifications: engine.notifications().entries().iter().map(|n| n.id).collect(),
        }
    }

    /// Add a message.
    #[must_use]
    pub fn with_message(mut self, message: MessageSnapshot) -> Self {
        self.messages.push(message);
        self
    }

    /// Add a channel.
    #[must_use]
    pub fn with_channel(mut self, channel: ChannelSnapshot) -> Self {
        self.channels.push(channel);
        self
    }
}

/// Snapshot of one message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageSnapshot {
    /// Confirmed or placeholder id
    pub id: MessageId,
    /// Sender
    pub sender_id: Option<UserId>,
    /// Body text
    pub body: String,
    /// Correlation ref while optimistic
    pub client_ref: Option<u64>,
}

impl MessageSnapshot {
    /// Confirmed message.
    pub fn confirmed(id: MessageId, sender_id: UserId, body: &str) -> Self {
        Self { id, sender_id: Some(sender_id), body: body.to_string(), client_ref: None }
    }

    /// Optimistic message whose id doubles as its correlation ref.
    pub fn optimistic(id: MessageId, sender_id: UserId, body: &str) -> Self {
        Self { client_ref: Some(id), ..Self::confirmed(id, sender_id, body) }
    }
}

/// Snapshot of one channel connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelSnapshot {
    /// Address display form
    pub address: String,
    /// Room as `workspace/room` for room channels
    pub room: Option<String>,
    /// Connection state
    pub state: String,
    /// Heartbeat timer armed
    pub heartbeat_armed: bool,
    /// Reconnect timer armed
    pub reconnect_armed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_snapshot() {
        assert!(SystemSnapshot::empty().clients.is_empty());
    }

    #[test]
    fn client_snapshot_builder() {
        let client = ClientSnapshot::new(42)
            .with_message(MessageSnapshot::confirmed(1, 2, "hi"))
            .with_message(MessageSnapshot::optimistic(1000, 42, "yo"));

        assert_eq!(client.user_id, 42);
        assert_eq!(client.messages.len(), 2);
        assert_eq!(client.messages[1].client_ref, Some(1000));
    }
}
