//! Chat synchronization for the active room.
//!
//! Maintains the ordered message list with optimistic sends, paginated
//! history, the typing set, and the local typing indicator. Like every other
//! component this is a pure state machine: it returns [`ChatEffect`]s and the
//! engine turns them into channel sends, REST calls and UI notifications.
//!
//! # Invariants
//!
//! - A confirmed message id appears at most once in the list.
//! - An optimistic entry is replaced in place by its confirmation, or removed
//!   when its REST fallback fails. It is never duplicated.
//! - Older pages are prepended as a block; the list is never re-sorted.
//! - Results of requests issued for an earlier room generation are discarded.
//! - Only the most recently issued history load is applied; a reload
//!   supersedes an older-page fetch still in flight.

use std::{
    collections::HashSet,
    ops::Sub,
    time::Duration,
};

use murmur_proto::{
    HistoryPage, MessageId, MessageKind, MessageRecord, OutboundFrame, RoomId, RoomKey, UserId,
};

use crate::{
    engine::Identity,
    error::ApiError,
    event::{HistoryRequest, LoadKind, PostRequest},
    typing::{OutgoingTyping, TypingIndicatorSet},
};

/// Messages per history page.
pub const DEFAULT_PAGE_SIZE: usize = 30;

/// Minimum time between two accepted sends.
pub const DEFAULT_SEND_COOLDOWN: Duration = Duration::from_millis(1000);

/// Local typing indicator lifetime without input.
pub const DEFAULT_TYPING_TIMEOUT: Duration = Duration::from_secs(5);

/// Remote typing entries expire after this long without a refresh (twice the
/// heartbeat interval).
pub const DEFAULT_REMOTE_TYPING_TTL: Duration = Duration::from_secs(60);

/// Chat configuration
#[derive(Debug, Clone, Copy)]
pub struct ChatConfig {
    /// History page size
    pub page_size: usize,
    /// Send throttle
    pub send_cooldown: Duration,
    /// Local typing timeout
    pub typing_timeout: Duration,
    /// Remote typing expiry
    pub remote_typing_ttl: Duration,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            send_cooldown: DEFAULT_SEND_COOLDOWN,
            typing_timeout: DEFAULT_TYPING_TIMEOUT,
            remote_typing_ttl: DEFAULT_REMOTE_TYPING_TTL,
        }
    }
}

/// Where a message's id came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    /// Server-assigned id
    Confirmed,
    /// Client-minted placeholder awaiting confirmation
    Optimistic {
        /// Correlation reference sent with the message
        client_ref: u64,
    },
}

/// Sender display info.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderInfo {
    /// Display name
    pub nickname: String,
    /// Avatar URL
    pub avatar: Option<String>,
}

/// A message in the active room's list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    /// Server id, or the optimistic placeholder id
    pub id: MessageId,
    /// Room the message belongs to
    pub room_id: RoomId,
    /// Sender; `None` for system messages
    pub sender_id: Option<UserId>,
    /// Body text
    pub body: String,
    /// Message kind
    pub kind: MessageKind,
    /// Creation time (Unix millis)
    pub created_at: i64,
    /// Sender display info
    pub sender: Option<SenderInfo>,
    /// Confirmed or optimistic
    pub provenance: Provenance,
}

impl ChatMessage {
    /// Confirmed message from a server record.
    pub fn confirmed(record: MessageRecord, room_id: RoomId) -> Self {
        let sender = record
            .nickname
            .map(|nickname| SenderInfo { nickname, avatar: record.avatar });

        Self {
            id: record.id,
            room_id: record.room_id.unwrap_or(room_id),
            sender_id: record.sender_id,
            body: record.message,
            kind: record.kind,
            created_at: record.created_at,
            sender,
            provenance: Provenance::Confirmed,
        }
    }

    /// True while awaiting confirmation.
    pub fn is_optimistic(&self) -> bool {
        matches!(self.provenance, Provenance::Optimistic { .. })
    }

    /// Correlation reference, for optimistic entries.
    pub fn client_ref(&self) -> Option<u64> {
        match self.provenance {
            Provenance::Optimistic { client_ref } => Some(client_ref),
            Provenance::Confirmed => None,
        }
    }
}

/// Work requested by [`ChatSync`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEffect {
    /// Send on the active room's channel (dropped if disconnected)
    Transmit(OutboundFrame),
    /// Fetch a history page
    Fetch(HistoryRequest),
    /// Send over REST
    Post(PostRequest),
    /// Mark the room read over REST
    MarkRead(RoomKey),
    /// Message list changed
    MessagesChanged,
    /// Typing set changed
    TypingChanged,
    /// Scroll to newest message
    ScrollToBottom,
    /// Keep the reading position across a prepend
    PreserveScrollAnchor,
}

/// Chat state for the active room.
#[derive(Debug, Clone)]
pub struct ChatSync<I>
where
    I: Copy + Ord + Sub<Output = Duration>,
{
    identity: Identity,
    config: ChatConfig,
    room: Option<RoomKey>,
    /// Bumped on every room switch; stale results carry an older value
    generation: u64,
    /// Bumped on every history load
    load_epoch: u64,
    messages: Vec<ChatMessage>,
    total: Option<u64>,
    has_more_older: bool,
    loading: Option<LoadKind>,
    last_send: Option<I>,
    last_optimistic_id: MessageId,
    typing: TypingIndicatorSet<I>,
    outgoing_typing: OutgoingTyping<I>,
}

impl<I> ChatSync<I>
where
    I: Copy + Ord + Sub<Output = Duration>,
{
    /// Create chat state with no active room.
    pub fn new(identity: Identity, config: ChatConfig) -> Self {
        Self {
            identity,
            config,
            room: None,
            generation: 0,
            load_epoch: 0,
            messages: Vec::new(),
            total: None,
            has_more_older: false,
            loading: None,
            last_send: None,
            last_optimistic_id: 0,
            typing: TypingIndicatorSet::default(),
            outgoing_typing: OutgoingTyping::default(),
        }
    }

    /// Active room.
    pub fn room(&self) -> Option<RoomKey> {
        self.room
    }

    /// Current room generation.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Messages, oldest first.
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Server's total message count, once a page has loaded.
    pub fn total(&self) -> Option<u64> {
        self.total
    }

    /// Whether older history remains.
    pub fn has_more_older(&self) -> bool {
        self.has_more_older
    }

    /// Load in flight, if any.
    pub fn loading(&self) -> Option<LoadKind> {
        self.loading
    }

    /// Other users typing.
    pub fn typing(&self) -> &TypingIndicatorSet<I> {
        &self.typing
    }

    /// Whether the local user is flagged as typing.
    pub fn is_typing(&self) -> bool {
        self.outgoing_typing.is_typing()
    }

    /// Number of confirmed messages loaded.
    pub fn confirmed_count(&self) -> usize {
        self.messages.iter().filter(|m| !m.is_optimistic()).count()
    }

    /// Switch to `room` and load its most recent page.
    pub fn enter_room(&mut self, room: RoomKey) -> Vec<ChatEffect> {
        self.reset();
        self.room = Some(room);
        tracing::debug!(%room, generation = self.generation, "entered room");

        let mut effects = vec![ChatEffect::MessagesChanged];
        effects.extend(self.begin_load(room, LoadKind::Initial));
        effects
    }

    /// Leave the active room. In-flight results are discarded on arrival.
    pub fn leave_room(&mut self) -> Vec<ChatEffect> {
        if self.room.take().is_none() {
            return Vec::new();
        }
        self.reset();
        vec![ChatEffect::MessagesChanged, ChatEffect::TypingChanged]
    }

    /// Fetch the most recent page, replacing the list on arrival.
    ///
    /// An older-page fetch still in flight is superseded and its result
    /// dropped, since its offset was taken from the list being replaced.
    pub fn load_initial(&mut self) -> Vec<ChatEffect> {
        let Some(room) = self.room else {
            return Vec::new();
        };
        if self.loading == Some(LoadKind::Initial) {
            return Vec::new();
        }
        self.begin_load(room, LoadKind::Initial)
    }

    /// Fetch the next older page. No-op while loading or when exhausted.
    pub fn load_older(&mut self) -> Vec<ChatEffect> {
        let Some(room) = self.room else {
            return Vec::new();
        };
        if self.loading.is_some() || !self.has_more_older {
            return Vec::new();
        }
        self.begin_load(room, LoadKind::Older)
    }

    fn begin_load(&mut self, room: RoomKey, kind: LoadKind) -> Vec<ChatEffect> {
        let offset = match kind {
            LoadKind::Initial => 0,
            LoadKind::Older => self.confirmed_count(),
        };
        self.loading = Some(kind);
        self.load_epoch += 1;

        vec![ChatEffect::Fetch(HistoryRequest {
            room,
            generation: self.generation,
            epoch: self.load_epoch,
            kind,
            limit: self.config.page_size,
            offset,
        })]
    }

    /// Apply a history result.
    pub fn handle_history(
        &mut self,
        request: &HistoryRequest,
        result: Result<HistoryPage, ApiError>,
    ) -> Vec<ChatEffect> {
        if !self.is_current(request.room, request.generation) {
            tracing::debug!(room = %request.room, "discarding history for inactive room");
            return Vec::new();
        }
        if request.epoch != self.load_epoch || self.loading != Some(request.kind) {
            tracing::debug!(room = %request.room, kind = ?request.kind, "discarding superseded history");
            return Vec::new();
        }
        self.loading = None;

        let page = match result {
            Ok(page) => page,
            Err(err) => {
                tracing::warn!(room = %request.room, kind = ?request.kind, %err, "history fetch failed");
                return Vec::new();
            },
        };

        let fetched = page.messages.len();
        let room_id = request.room.room_id;
        let mut effects = vec![ChatEffect::MessagesChanged];

        match request.kind {
            LoadKind::Initial => {
                let pending: Vec<ChatMessage> =
                    self.messages.drain(..).filter(ChatMessage::is_optimistic).collect();

                let mut seen = HashSet::new();
                self.messages = page
                    .messages
                    .into_iter()
                    .filter(|record| seen.insert(record.id))
                    .map(|record| ChatMessage::confirmed(record, room_id))
                    .collect();
                self.messages.extend(pending);
                effects.push(ChatEffect::ScrollToBottom);
            },
            LoadKind::Older => {
                let mut seen: HashSet<MessageId> = self.messages.iter().map(|m| m.id).collect();
                let older: Vec<ChatMessage> = page
                    .messages
                    .into_iter()
                    .filter(|record| seen.insert(record.id))
                    .map(|record| ChatMessage::confirmed(record, room_id))
                    .collect();

                if !older.is_empty() {
                    self.messages.splice(0..0, older);
                    effects.push(ChatEffect::PreserveScrollAnchor);
                }
            },
        }

        self.total = Some(page.total);
        self.has_more_older =
            fetched >= self.config.page_size && (self.confirmed_count() as u64) < page.total;

        effects
    }

    /// Send a message.
    ///
    /// Rejected silently when blank or within the cooldown. Otherwise an
    /// optimistic entry is appended and the message goes over the channel
    /// when `connected`, or over REST when not.
    pub fn send(&mut self, text: &str, now: I, wall_clock_millis: i64, connected: bool) -> Vec<ChatEffect> {
        let Some(room) = self.room else {
            tracing::debug!("send without active room");
            return Vec::new();
        };
        if text.trim().is_empty() {
            return Vec::new();
        }
        if let Some(last) = self.last_send {
            if now - last < self.config.send_cooldown {
                tracing::debug!(%room, "send throttled");
                return Vec::new();
            }
        }

        self.last_send = Some(now);

        let mut effects = Vec::new();
        if let Some(stop) = self.outgoing_typing.stop() {
            effects.push(ChatEffect::Transmit(stop));
        }

        let id = (wall_clock_millis.max(0) as u64).max(self.last_optimistic_id + 1);
        self.last_optimistic_id = id;

        self.messages.push(ChatMessage {
            id,
            room_id: room.room_id,
            sender_id: Some(self.identity.user_id),
            body: text.to_string(),
            kind: MessageKind::Text,
            created_at: wall_clock_millis,
            sender: Some(SenderInfo { nickname: self.identity.nickname.clone(), avatar: None }),
            provenance: Provenance::Optimistic { client_ref: id },
        });
        effects.push(ChatEffect::MessagesChanged);
        effects.push(ChatEffect::ScrollToBottom);

        if connected {
            effects.push(ChatEffect::Transmit(OutboundFrame::Message {
                message: text.to_string(),
                client_ref: Some(id),
            }));
        } else {
            tracing::debug!(%room, client_ref = id, "room channel down, sending over REST");
            effects.push(ChatEffect::Post(PostRequest {
                room,
                generation: self.generation,
                body: text.to_string(),
                client_ref: id,
            }));
        }

        effects
    }

    /// Apply a REST fallback result.
    ///
    /// Failure retracts the optimistic entry. Success reconciles like a
    /// channel echo.
    pub fn handle_post_result(
        &mut self,
        request: &PostRequest,
        result: Result<MessageRecord, ApiError>,
    ) -> Vec<ChatEffect> {
        if !self.is_current(request.room, request.generation) {
            return Vec::new();
        }

        match result {
            Ok(mut record) => {
                record.client_ref = record.client_ref.or(Some(request.client_ref));
                if record.sender_id.is_none() {
                    record.sender_id = Some(self.identity.user_id);
                }
                self.reconcile_own(record)
            },
            Err(err) => {
                tracing::warn!(room = %request.room, client_ref = request.client_ref, %err, "fallback send failed");
                match self.position_by_ref(request.client_ref) {
                    Some(index) => {
                        self.messages.remove(index);
                        vec![ChatEffect::MessagesChanged]
                    },
                    None => Vec::new(),
                }
            },
        }
    }

    /// Apply an inbound `message` frame.
    pub fn handle_message(&mut self, record: MessageRecord) -> Vec<ChatEffect> {
        let Some(room) = self.room else {
            return Vec::new();
        };

        if record.sender_id == Some(self.identity.user_id) {
            return self.reconcile_own(record);
        }

        if self.contains_id(record.id) {
            return Vec::new();
        }

        self.messages.push(ChatMessage::confirmed(record, room.room_id));
        vec![ChatEffect::MessagesChanged, ChatEffect::ScrollToBottom, ChatEffect::MarkRead(room)]
    }

    /// Match a confirmed message from the local user against pending
    /// optimistic entries.
    ///
    /// The echoed correlation reference is authoritative. Only when the
    /// server echoes none do we fall back to the newest pending entry with an
    /// identical body.
    fn reconcile_own(&mut self, record: MessageRecord) -> Vec<ChatEffect> {
        let Some(room) = self.room else {
            return Vec::new();
        };

        let by_ref = record.client_ref.and_then(|client_ref| self.position_by_ref(client_ref));

        if self.contains_confirmed(record.id) {
            // Confirmed earlier through the other path
            return match by_ref {
                Some(index) => {
                    self.messages.remove(index);
                    vec![ChatEffect::MessagesChanged]
                },
                None => Vec::new(),
            };
        }

        let index = match record.client_ref {
            Some(_) => by_ref,
            None => self.position_by_body(&record.message),
        };

        let confirmed = ChatMessage::confirmed(record, room.room_id);
        match index {
            Some(index) => {
                self.messages[index] = confirmed;
                vec![ChatEffect::MessagesChanged]
            },
            None => {
                self.messages.push(confirmed);
                vec![ChatEffect::MessagesChanged, ChatEffect::ScrollToBottom]
            },
        }
    }

    /// Apply an inbound `typing` frame.
    pub fn handle_typing(&mut self, user_id: UserId, nickname: String, now: I) -> Vec<ChatEffect> {
        if user_id == self.identity.user_id {
            return Vec::new();
        }
        if self.typing.insert(user_id, nickname, now) {
            vec![ChatEffect::TypingChanged]
        } else {
            Vec::new()
        }
    }

    /// Apply an inbound `stop_typing` frame.
    pub fn handle_stop_typing(&mut self, user_id: UserId) -> Vec<ChatEffect> {
        if self.typing.remove(user_id) { vec![ChatEffect::TypingChanged] } else { Vec::new() }
    }

    /// Composer text changed.
    pub fn input_changed(&mut self, text: &str, now: I) -> Vec<ChatEffect> {
        if self.room.is_none() {
            return Vec::new();
        }
        self.outgoing_typing.input_changed(text, now).map(ChatEffect::Transmit).into_iter().collect()
    }

    /// Stop the local typing indicator now.
    pub fn stop_typing(&mut self) -> Vec<ChatEffect> {
        self.outgoing_typing.stop().map(ChatEffect::Transmit).into_iter().collect()
    }

    /// Process typing timers.
    pub fn tick(&mut self, now: I) -> Vec<ChatEffect> {
        let mut effects = Vec::new();

        if let Some(stop) = self.outgoing_typing.tick(now, self.config.typing_timeout) {
            effects.push(ChatEffect::Transmit(stop));
        }
        if self.typing.expire(now, self.config.remote_typing_ttl) {
            effects.push(ChatEffect::TypingChanged);
        }

        effects
    }

    fn reset(&mut self) {
        self.generation += 1;
        self.messages.clear();
        self.total = None;
        self.has_more_older = false;
        self.loading = None;
        self.last_send = None;
        self.typing.clear();
        self.outgoing_typing = OutgoingTyping::default();
    }

    fn is_current(&self, room: RoomKey, generation: u64) -> bool {
        self.room == Some(room) && self.generation == generation
    }

    fn contains_id(&self, id: MessageId) -> bool {
        self.messages.iter().any(|m| m.id == id)
    }

    fn contains_confirmed(&self, id: MessageId) -> bool {
        self.messages.iter().any(|m| m.id == id && !m.is_optimistic())
    }

    fn position_by_ref(&self, client_ref: u64) -> Option<usize> {
        self.messages.iter().position(|m| m.client_ref() == Some(client_ref))
    }

    fn position_by_body(&self, body: &str) -> Option<usize> {
        let self_id = Some(self.identity.user_id);
        self.messages.iter().rposition(|m| m.is_optimistic() && m.sender_id == self_id && m.body == body)
    }
}
