//! REST collaborator contract.
//!
//! The engine never calls this itself: it emits [`crate::SyncAction`]s and the
//! driver performs the calls, feeding results back as events. The trait exists
//! so production (`http::HttpApi` with the `transport` feature) and
//! simulation backends are interchangeable in the driver.

use async_trait::async_trait;
use murmur_proto::{HistoryPage, MessageRecord, RoomKey};

use crate::error::ApiError;

/// Request/response API consumed by the sync engine.
#[async_trait]
pub trait RestApi: Send + Sync {
    /// Fetch `limit` messages of `room`, skipping the `offset` newest.
    ///
    /// Messages come back oldest first, together with the room's total
    /// message count.
    async fn fetch_history(
        &self,
        room: RoomKey,
        limit: usize,
        offset: usize,
    ) -> Result<HistoryPage, ApiError>;

    /// Post a message when the room channel is down.
    ///
    /// Returns the confirmed message, which should echo `client_ref`.
    async fn send_message(
        &self,
        room: RoomKey,
        body: &str,
        client_ref: u64,
    ) -> Result<MessageRecord, ApiError>;

    /// Mark every message in `room` as read.
    async fn mark_read(&self, room: RoomKey) -> Result<(), ApiError>;
}
