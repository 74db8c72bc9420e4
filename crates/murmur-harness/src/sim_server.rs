//! In-memory chat server for simulation.
//!
//! `SimServer` plays both server roles the engine talks to: it stores room
//! history for the REST API and accepts channel messages so the driver can
//! echo them back. Failure switches let tests exercise the REST error paths.
//!
//! This server is designed for test-driven usage where the driver explicitly
//! calls it; it never runs autonomously.

#![allow(clippy::disallowed_types, reason = "Synchronous locking operations only")]

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use async_trait::async_trait;
use murmur_client::{ApiError, RestApi};
use murmur_proto::{HistoryPage, MessageId, MessageKind, MessageRecord, RoomKey, UserId};

#[derive(Debug, Default)]
struct ServerState {
    /// Room history, oldest first
    rooms: HashMap<RoomKey, Vec<MessageRecord>>,
    next_id: MessageId,
    fail_posts: bool,
    fail_history: bool,
    read_marks: Vec<RoomKey>,
    history_requests: Vec<(RoomKey, usize, usize)>,
}

/// Shared in-memory server. Clones share state.
#[derive(Debug, Clone)]
pub struct SimServer {
    state: Arc<Mutex<ServerState>>,
    /// User the REST API acts as
    user_id: UserId,
}

impl SimServer {
    /// Empty server whose REST API acts as `user_id`.
    pub fn new(user_id: UserId) -> Self {
        Self {
            state: Arc::new(Mutex::new(ServerState { next_id: 1, ..ServerState::default() })),
            user_id,
        }
    }

    fn state(&self) -> MutexGuard<'_, ServerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append `count` messages from `sender` to `room`. Returns their ids.
    pub fn seed_room(&self, room: RoomKey, sender: UserId, count: usize) -> Vec<MessageId> {
        (0..count).map(|n| self.post(room, sender, &format!("message {n}"), None).id).collect()
    }

    /// Store a message and return the confirmed record.
    pub fn post(&self, room: RoomKey, sender: UserId, body: &str, client_ref: Option<u64>) -> MessageRecord {
        let mut state = self.state();
        let id = state.next_id;
        state.next_id += 1;

        let record = MessageRecord {
            id,
            room_id: Some(room.room_id),
            sender_id: Some(sender),
            nickname: Some(format!("user{sender}")),
            avatar: None,
            message: body.to_string(),
            kind: MessageKind::Text,
            created_at: id as i64,
            client_ref,
        };
        state.rooms.entry(room).or_default().push(record.clone());
        record
    }

    /// Page of `limit` messages skipping the `offset` newest, oldest first.
    pub fn history(&self, room: RoomKey, limit: usize, offset: usize) -> HistoryPage {
        let mut state = self.state();
        state.history_requests.push((room, limit, offset));

        let messages = state.rooms.get(&room).map(Vec::as_slice).unwrap_or_default();
        let end = messages.len().saturating_sub(offset);
        let start = end.saturating_sub(limit);

        HistoryPage { messages: messages[start..end].to_vec(), total: messages.len() as u64 }
    }

    /// Record a read mark.
    pub fn mark_read(&self, room: RoomKey) {
        self.state().read_marks.push(room);
    }

    /// Make REST posts fail with a 503.
    pub fn set_fail_posts(&self, fail: bool) {
        self.state().fail_posts = fail;
    }

    /// Make history fetches fail with a connection error.
    pub fn set_fail_history(&self, fail: bool) {
        self.state().fail_history = fail;
    }

    /// Whether REST posts currently fail.
    pub fn fails_posts(&self) -> bool {
        self.state().fail_posts
    }

    /// Whether history fetches currently fail.
    pub fn fails_history(&self) -> bool {
        self.state().fail_history
    }

    /// Messages stored for `room`.
    pub fn message_count(&self, room: RoomKey) -> usize {
        self.state().rooms.get(&room).map_or(0, Vec::len)
    }

    /// Read marks in arrival order.
    pub fn read_marks(&self) -> Vec<RoomKey> {
        self.state().read_marks.clone()
    }

    /// History requests as `(room, limit, offset)`, in arrival order.
    pub fn history_requests(&self) -> Vec<(RoomKey, usize, usize)> {
        self.state().history_requests.clone()
    }

    /// User the REST API acts as.
    pub fn user_id(&self) -> UserId {
        self.user_id
    }
}

#[async_trait]
impl RestApi for SimServer {
    async fn fetch_history(
        &self,
        room: RoomKey,
        limit: usize,
        offset: usize,
    ) -> Result<HistoryPage, ApiError> {
        if self.fails_history() {
            return Err(ApiError::Http("connection refused".to_string()));
        }
        Ok(self.history(room, limit, offset))
    }

    async fn send_message(
        &self,
        room: RoomKey,
        body: &str,
        client_ref: u64,
    ) -> Result<MessageRecord, ApiError> {
        if self.fails_posts() {
            return Err(ApiError::Status { status: 503, body: "unavailable".to_string() });
        }
        Ok(self.post(room, self.user_id, body, Some(client_ref)))
    }

    async fn mark_read(&self, room: RoomKey) -> Result<(), ApiError> {
        SimServer::mark_read(self, room);
        Ok(())
    }
}
