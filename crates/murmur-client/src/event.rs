//! Engine events and actions.

use murmur_proto::{
    ChannelAddress, HistoryPage, MessageRecord, Notification, PresenceStatus, RoomKey, UserId,
};

use crate::error::ApiError;

/// Which history load a request belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadKind {
    /// Most recent page; replaces the list
    Initial,
    /// Next older page; prepended
    Older,
}

/// History fetch the caller must perform against the REST collaborator.
///
/// Echo it back unchanged in [`SyncEvent::HistoryLoaded`]; the generation is
/// how results for a room the user already left get discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRequest {
    /// Room to fetch from
    pub room: RoomKey,
    /// Room generation at request time
    pub generation: u64,
    /// Load sequence at request time; a newer load supersedes this one
    pub epoch: u64,
    /// Initial or older page
    pub kind: LoadKind,
    /// Page size
    pub limit: usize,
    /// Number of newest messages to skip
    pub offset: usize,
}

/// REST fallback send the caller must perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostRequest {
    /// Target room
    pub room: RoomKey,
    /// Room generation at request time
    pub generation: u64,
    /// Body text
    pub body: String,
    /// Correlation reference of the optimistic entry
    pub client_ref: u64,
}

/// Events the caller feeds into the engine.
///
/// The caller is responsible for:
/// - Reporting transport lifecycle and inbound frames per address
/// - Driving time forward via ticks
/// - Forwarding UI intents
/// - Feeding back REST results
///
/// Generic over `I` (Instant type) to support both production
/// (`std::time::Instant`) and simulated time.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent<I = std::time::Instant> {
    /// Open the global channel.
    Start,

    /// Close every channel.
    Shutdown,

    /// Transport for `address` is open.
    TransportOpened {
        /// Channel address
        address: ChannelAddress,
    },

    /// Transport for `address` closed, errored or failed to open.
    TransportClosed {
        /// Channel address
        address: ChannelAddress,
    },

    /// Text frame arrived on `address`.
    FrameReceived {
        /// Channel address
        address: ChannelAddress,
        /// Raw envelope JSON
        text: String,
    },

    /// Time tick for timers.
    ///
    /// The caller should send ticks periodically (well under a second) so
    /// heartbeats, reconnects, idle detection and typing expiry fire on time.
    Tick {
        /// Current time from the environment.
        now: I,
    },

    /// Switch the active chat room.
    EnterRoom {
        /// Room to enter
        room: RoomKey,
    },

    /// Leave the active chat room.
    LeaveRoom,

    /// Load the next older history page.
    LoadOlder,

    /// Reload the most recent page of the active room.
    ReloadHistory,

    /// Send a chat message.
    SendMessage {
        /// Body text
        text: String,
    },

    /// Composer text changed.
    InputChanged {
        /// Current composer text
        text: String,
    },

    /// User activity (pointer, key press, click, scroll).
    Activity,

    /// Change own presence status.
    ChangeStatus {
        /// New status
        status: PresenceStatus,
    },

    /// Change own custom status.
    ChangeCustomStatus {
        /// Status text
        text: Option<String>,
        /// Status emoji
        emoji: Option<String>,
    },

    /// Watch presence of more users.
    SubscribePresence {
        /// Users to add to the watch-set
        user_ids: Vec<UserId>,
    },

    /// Result of a [`SyncAction::FetchHistory`].
    HistoryLoaded {
        /// The request as issued
        request: HistoryRequest,
        /// Page or failure
        result: Result<HistoryPage, ApiError>,
    },

    /// Result of a [`SyncAction::PostMessage`].
    PostCompleted {
        /// The request as issued
        request: PostRequest,
        /// Confirmed message or failure
        result: Result<MessageRecord, ApiError>,
    },
}

/// Actions the engine produces for the caller to execute.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncAction {
    /// Open a transport for `address`.
    OpenTransport {
        /// Channel address
        address: ChannelAddress,
    },

    /// Close the transport for `address`.
    CloseTransport {
        /// Channel address
        address: ChannelAddress,
    },

    /// Write an encoded frame to the transport for `address`.
    SendFrame {
        /// Channel address
        address: ChannelAddress,
        /// Envelope JSON
        text: String,
    },

    /// Fetch a history page; answer with [`SyncEvent::HistoryLoaded`].
    FetchHistory(HistoryRequest),

    /// Send over REST; answer with [`SyncEvent::PostCompleted`].
    PostMessage(PostRequest),

    /// Mark `room` as read. Fire and forget.
    MarkRead {
        /// Room to mark
        room: RoomKey,
    },

    /// The active room's message list changed.
    MessagesChanged,

    /// The active room's typing set changed.
    TypingChanged,

    /// Presence records changed for these users.
    PresenceChanged {
        /// Affected users
        user_ids: Vec<UserId>,
    },

    /// A new notification arrived.
    NotificationPublished(Notification),

    /// Scroll the message view to the newest message.
    ScrollToBottom,

    /// Older messages were prepended: keep the reading position by scrolling
    /// down by (new content height - old content height).
    PreserveScrollAnchor,
}
