//! Sync engine.
//!
//! The `SyncEngine` is the top-level state machine. It owns the channel
//! registry and the three sync components, routes inbound frames to them, and
//! turns their outputs into [`SyncAction`]s.
//!
//! The global channel carries presence and notifications for the whole
//! session. At most one room channel is held at a time: entering a room
//! releases the previous room's channel before acquiring the new one.

use murmur_core::{ChannelAction, ChannelRegistry, ConnectionConfig, env::Environment};
use murmur_proto::{ChannelAddress, InboundFrame, OutboundFrame, RoomKey, UserId};

use crate::{
    chat::{ChatConfig, ChatEffect, ChatSync},
    error::SyncError,
    event::{SyncAction, SyncEvent},
    notifications::NotificationRelay,
    presence::{PresenceConfig, PresenceSync},
};

/// The local user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Stable user id
    pub user_id: UserId,
    /// Display name used for optimistic messages
    pub nickname: String,
}

impl Identity {
    /// Create an identity.
    pub fn new(user_id: UserId, nickname: impl Into<String>) -> Self {
        Self { user_id, nickname: nickname.into() }
    }
}

/// Engine configuration
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncConfig {
    /// Heartbeat and reconnect policy for every channel
    pub connection: ConnectionConfig,
    /// Chat timings and page size
    pub chat: ChatConfig,
    /// Idle detection
    pub presence: PresenceConfig,
}

/// Sync engine for one signed-in user.
pub struct SyncEngine<E: Environment> {
    /// Environment for time, randomness and wall clock.
    env: E,

    /// Local user.
    identity: Identity,

    /// Live channels keyed by address.
    channels: ChannelRegistry<E::Instant>,

    /// Presence map, watch-set and idle detection.
    presence: PresenceSync<E::Instant>,

    /// Active room chat state.
    chat: ChatSync<E::Instant>,

    /// Notification feed.
    notifications: NotificationRelay,

    /// Whether the global channel is held.
    started: bool,
}

impl<E: Environment> SyncEngine<E> {
    /// Create an engine. Nothing is opened until [`SyncEvent::Start`].
    pub fn new(env: E, identity: Identity, config: SyncConfig) -> Self {
        let now = env.now();
        Self {
            channels: ChannelRegistry::new(config.connection),
            presence: PresenceSync::new(identity.user_id, config.presence, now),
            chat: ChatSync::new(identity.clone(), config.chat),
            notifications: NotificationRelay::new(),
            started: false,
            identity,
            env,
        }
    }

    /// Local user.
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Environment.
    pub fn env(&self) -> &E {
        &self.env
    }

    /// Channel registry.
    pub fn channels(&self) -> &ChannelRegistry<E::Instant> {
        &self.channels
    }

    /// Presence state.
    pub fn presence(&self) -> &PresenceSync<E::Instant> {
        &self.presence
    }

    /// Chat state for the active room.
    pub fn chat(&self) -> &ChatSync<E::Instant> {
        &self.chat
    }

    /// Notification feed.
    pub fn notifications(&self) -> &NotificationRelay {
        &self.notifications
    }

    /// Whether the engine has been started.
    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Process an event and return resulting actions.
    ///
    /// # Errors
    ///
    /// - `SyncError::Protocol` if an outbound frame fails to encode
    /// - `SyncError::Channel` if channel bookkeeping is inconsistent
    pub fn handle(&mut self, event: SyncEvent<E::Instant>) -> Result<Vec<SyncAction>, SyncError> {
        match event {
            SyncEvent::Start => self.handle_start(),
            SyncEvent::Shutdown => self.handle_shutdown(),
            SyncEvent::TransportOpened { address } => {
                let now = self.env.now();
                let actions = self.channels.handle_opened(address, now);
                encode_actions(actions)
            },
            SyncEvent::TransportClosed { address } => {
                let now = self.env.now();
                self.channels.handle_closed(address, &self.env, now);
                Ok(Vec::new())
            },
            SyncEvent::FrameReceived { address, text } => self.handle_frame(address, &text),
            SyncEvent::Tick { now } => self.handle_tick(now),
            SyncEvent::EnterRoom { room } => self.handle_enter_room(room),
            SyncEvent::LeaveRoom => self.handle_leave_room(),
            SyncEvent::LoadOlder => {
                let effects = self.chat.load_older();
                self.apply_chat(effects)
            },
            SyncEvent::ReloadHistory => {
                let effects = self.chat.load_initial();
                self.apply_chat(effects)
            },
            SyncEvent::SendMessage { text } => self.handle_send(&text),
            SyncEvent::InputChanged { text } => {
                let now = self.env.now();
                let effects = self.chat.input_changed(&text, now);
                self.apply_chat(effects)
            },
            SyncEvent::Activity => {
                let now = self.env.now();
                let frame = self.presence.activity(now);
                self.send_global(frame)
            },
            SyncEvent::ChangeStatus { status } => {
                let frame = self.presence.change_status(status);
                self.send_global(Some(frame))
            },
            SyncEvent::ChangeCustomStatus { text, emoji } => {
                let wall = self.env.wall_clock_millis();
                let frame = self.presence.change_custom_status(text, emoji, wall);
                let mut actions = self.send_global(Some(frame))?;
                actions.push(SyncAction::PresenceChanged { user_ids: vec![self.identity.user_id] });
                Ok(actions)
            },
            SyncEvent::SubscribePresence { user_ids } => self.handle_subscribe(user_ids),
            SyncEvent::HistoryLoaded { request, result } => {
                let effects = self.chat.handle_history(&request, result);
                self.apply_chat(effects)
            },
            SyncEvent::PostCompleted { request, result } => {
                let effects = self.chat.handle_post_result(&request, result);
                self.apply_chat(effects)
            },
        }
    }

    fn handle_start(&mut self) -> Result<Vec<SyncAction>, SyncError> {
        if self.started {
            return Ok(Vec::new());
        }
        self.started = true;
        tracing::info!(user_id = self.identity.user_id, "starting sync");

        let actions = self.channels.acquire(ChannelAddress::Global);
        if let Some(subscription) = self.presence.subscription() {
            self.channels.set_durable(ChannelAddress::Global, subscription)?;
        }
        encode_actions(actions)
    }

    fn handle_shutdown(&mut self) -> Result<Vec<SyncAction>, SyncError> {
        let mut actions = Vec::new();
        if self.chat.room().is_some() {
            actions.extend(self.handle_leave_room()?);
        }

        let closed = self.channels.close_all();
        actions.extend(encode_actions(closed)?);
        if self.started {
            tracing::info!(user_id = self.identity.user_id, "sync stopped");
        }
        self.started = false;
        Ok(actions)
    }

    fn handle_frame(&mut self, address: ChannelAddress, text: &str) -> Result<Vec<SyncAction>, SyncError> {
        if self.channels.get(&address).is_none() {
            tracing::debug!(%address, "frame on released channel");
            return Ok(Vec::new());
        }

        let frame = match InboundFrame::from_json(text) {
            Ok(frame) => frame,
            Err(err) => {
                tracing::debug!(%address, %err, "dropping malformed frame");
                return Ok(Vec::new());
            },
        };

        let active_room = self.chat.room().map(ChannelAddress::Room);
        let now = self.env.now();

        match frame {
            InboundFrame::PresenceUpdate(record) if address == ChannelAddress::Global => {
                let user_id = self.presence.handle_update(record);
                Ok(vec![SyncAction::PresenceChanged { user_ids: vec![user_id] }])
            },
            InboundFrame::PresenceStateSync(records) if address == ChannelAddress::Global => {
                let user_ids = self.presence.handle_state_sync(records);
                if user_ids.is_empty() {
                    return Ok(Vec::new());
                }
                Ok(vec![SyncAction::PresenceChanged { user_ids }])
            },
            InboundFrame::Notification(notification) if address == ChannelAddress::Global => {
                Ok(self
                    .notifications
                    .handle(notification)
                    .map(|published| SyncAction::NotificationPublished(published.clone()))
                    .into_iter()
                    .collect())
            },
            InboundFrame::Message(record) if Some(address) == active_room => {
                let effects = self.chat.handle_message(record);
                self.apply_chat(effects)
            },
            InboundFrame::Typing { user_id, nickname } if Some(address) == active_room => {
                let effects = self.chat.handle_typing(user_id, nickname, now);
                self.apply_chat(effects)
            },
            InboundFrame::StopTyping { user_id } if Some(address) == active_room => {
                let effects = self.chat.handle_stop_typing(user_id);
                self.apply_chat(effects)
            },
            other => {
                tracing::debug!(%address, ?other, "frame on unexpected channel");
                Ok(Vec::new())
            },
        }
    }

    fn handle_tick(&mut self, now: E::Instant) -> Result<Vec<SyncAction>, SyncError> {
        let channel_actions = self.channels.tick(now);
        let mut actions = encode_actions(channel_actions)?;

        let idle = self.presence.tick(now);
        actions.extend(self.send_global(idle)?);

        let effects = self.chat.tick(now);
        actions.extend(self.apply_chat(effects)?);

        Ok(actions)
    }

    fn handle_enter_room(&mut self, room: RoomKey) -> Result<Vec<SyncAction>, SyncError> {
        if self.chat.room() == Some(room) {
            return Ok(Vec::new());
        }

        let mut actions = Vec::new();
        if self.chat.room().is_some() {
            actions.extend(self.release_room()?);
        }

        tracing::info!(%room, "entering room");
        let opened = self.channels.acquire(ChannelAddress::Room(room));
        actions.extend(encode_actions(opened)?);

        let effects = self.chat.enter_room(room);
        actions.extend(self.apply_chat(effects)?);
        Ok(actions)
    }

    fn handle_leave_room(&mut self) -> Result<Vec<SyncAction>, SyncError> {
        if self.chat.room().is_none() {
            return Ok(Vec::new());
        }

        let mut actions = self.release_room()?;
        let effects = self.chat.leave_room();
        actions.extend(self.apply_chat(effects)?);
        Ok(actions)
    }

    /// Stop typing in the active room and release its channel.
    fn release_room(&mut self) -> Result<Vec<SyncAction>, SyncError> {
        let Some(room) = self.chat.room() else {
            return Ok(Vec::new());
        };

        let stop = self.chat.stop_typing();
        let mut actions = self.apply_chat(stop)?;

        let closed = self.channels.release(ChannelAddress::Room(room))?;
        actions.extend(encode_actions(closed)?);
        Ok(actions)
    }

    fn handle_send(&mut self, text: &str) -> Result<Vec<SyncAction>, SyncError> {
        let connected =
            self.chat.room().is_some_and(|room| self.channels.is_connected(&ChannelAddress::Room(room)));
        let now = self.env.now();
        let wall = self.env.wall_clock_millis();

        let effects = self.chat.send(text, now, wall, connected);
        self.apply_chat(effects)
    }

    fn handle_subscribe(&mut self, user_ids: Vec<UserId>) -> Result<Vec<SyncAction>, SyncError> {
        let frame = self.presence.subscribe(user_ids);
        if frame.is_none() {
            return Ok(Vec::new());
        }

        if self.channels.get(&ChannelAddress::Global).is_some() {
            if let Some(subscription) = self.presence.subscription() {
                self.channels.set_durable(ChannelAddress::Global, subscription)?;
            }
        }
        self.send_global(frame)
    }

    fn send_global(&mut self, frame: Option<OutboundFrame>) -> Result<Vec<SyncAction>, SyncError> {
        let Some(frame) = frame else {
            return Ok(Vec::new());
        };
        let actions = self.channels.send(ChannelAddress::Global, frame);
        encode_actions(actions)
    }

    fn apply_chat(&mut self, effects: Vec<ChatEffect>) -> Result<Vec<SyncAction>, SyncError> {
        let mut actions = Vec::with_capacity(effects.len());

        for effect in effects {
            match effect {
                ChatEffect::Transmit(frame) => {
                    let Some(room) = self.chat.room() else {
                        continue;
                    };
                    let sent = self.channels.send(ChannelAddress::Room(room), frame);
                    actions.extend(encode_actions(sent)?);
                },
                ChatEffect::Fetch(request) => actions.push(SyncAction::FetchHistory(request)),
                ChatEffect::Post(request) => actions.push(SyncAction::PostMessage(request)),
                ChatEffect::MarkRead(room) => actions.push(SyncAction::MarkRead { room }),
                ChatEffect::MessagesChanged => actions.push(SyncAction::MessagesChanged),
                ChatEffect::TypingChanged => actions.push(SyncAction::TypingChanged),
                ChatEffect::ScrollToBottom => actions.push(SyncAction::ScrollToBottom),
                ChatEffect::PreserveScrollAnchor => actions.push(SyncAction::PreserveScrollAnchor),
            }
        }

        Ok(actions)
    }
}

/// Convert channel actions into engine actions, encoding frames to JSON.
fn encode_actions(actions: Vec<ChannelAction>) -> Result<Vec<SyncAction>, SyncError> {
    actions
        .into_iter()
        .map(|action| -> Result<SyncAction, SyncError> {
            Ok(match action {
                ChannelAction::OpenTransport { address } => SyncAction::OpenTransport { address },
                ChannelAction::CloseTransport { address } => SyncAction::CloseTransport { address },
                ChannelAction::SendFrame { address, frame } => {
                    SyncAction::SendFrame { address, text: frame.to_json()? }
                },
            })
        })
        .collect()
}
