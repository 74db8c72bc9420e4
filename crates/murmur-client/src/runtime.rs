//! Async runtime
//!
//! Event loop that drives a [`SyncEngine`] against real WebSockets and a
//! [`RestApi`]. Uses `tokio::select!` over UI commands, transport events, REST
//! completions and a periodic tick, executes the resulting actions, and
//! forwards UI notifications to an observer channel as [`RuntimeUpdate`]s.

use std::{collections::HashMap, sync::Arc, time::Duration};

use murmur_core::env::Environment;
use murmur_proto::{ChannelAddress, Notification, PresenceRecord};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::{
    chat::ChatMessage,
    engine::{Identity, SyncConfig, SyncEngine},
    error::SyncError,
    event::{SyncAction, SyncEvent},
    rest::RestApi,
    system_env::SystemEnv,
    transport::{self, TransportEvent, TransportEventKind, TransportHandle},
};

/// Default interval between engine ticks.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(250);

/// Buffered transport events and REST completions.
const INBOX_CAPACITY: usize = 256;

/// Runtime errors.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Engine rejected an event.
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    /// The update observer went away.
    #[error("update channel closed")]
    UpdatesClosed,
}

/// Runtime configuration
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// WebSocket base URL, e.g. `wss://chat.example`
    pub ws_base_url: String,
    /// Engine tick interval
    pub tick_interval: Duration,
    /// Engine configuration
    pub sync: SyncConfig,
}

impl RuntimeConfig {
    /// Default configuration for `ws_base_url`.
    pub fn new(ws_base_url: impl Into<String>) -> Self {
        Self {
            ws_base_url: ws_base_url.into(),
            tick_interval: DEFAULT_TICK_INTERVAL,
            sync: SyncConfig::default(),
        }
    }
}

/// Snapshot pushed to the UI after the engine reports a change.
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeUpdate {
    /// Active room's messages, oldest first
    Messages(Vec<ChatMessage>),
    /// Display names of users typing in the active room
    Typing(Vec<String>),
    /// Changed presence records
    Presence(Vec<PresenceRecord>),
    /// Newly arrived notification
    Notification(Notification),
    /// Scroll the message view to the bottom
    ScrollToBottom,
    /// Keep the reading position across a prepend
    PreserveScrollAnchor,
}

/// Executes engine actions: transports, REST calls and UI updates.
struct Executor<A: RestApi + 'static> {
    engine: SyncEngine<SystemEnv>,
    api: Arc<A>,
    ws_base_url: String,

    /// Live transports; at most one per address.
    links: HashMap<ChannelAddress, TransportHandle>,

    /// Sequence number for the next transport.
    next_seq: u64,

    transport_tx: mpsc::Sender<TransportEvent>,
    completion_tx: mpsc::Sender<SyncEvent>,
    updates: mpsc::Sender<RuntimeUpdate>,
}

/// Async runtime for one signed-in user.
pub struct Runtime<A: RestApi + 'static> {
    executor: Executor<A>,
    tick_interval: Duration,
    transport_rx: mpsc::Receiver<TransportEvent>,
    completion_rx: mpsc::Receiver<SyncEvent>,
}

impl<A: RestApi + 'static> Runtime<A> {
    /// Create a runtime. UI updates are sent on `updates`.
    pub fn new(
        config: RuntimeConfig,
        identity: Identity,
        api: A,
        updates: mpsc::Sender<RuntimeUpdate>,
    ) -> Self {
        let (transport_tx, transport_rx) = mpsc::channel(INBOX_CAPACITY);
        let (completion_tx, completion_rx) = mpsc::channel(INBOX_CAPACITY);

        let executor = Executor {
            engine: SyncEngine::new(SystemEnv::new(), identity, config.sync),
            api: Arc::new(api),
            ws_base_url: config.ws_base_url,
            links: HashMap::new(),
            next_seq: 0,
            transport_tx,
            completion_tx,
            updates,
        };

        Self { executor, tick_interval: config.tick_interval, transport_rx, completion_rx }
    }

    /// The engine, for inspection before `run`.
    pub fn engine(&self) -> &SyncEngine<SystemEnv> {
        &self.executor.engine
    }

    /// Run until `commands` closes, then shut down every channel.
    ///
    /// `commands` carries UI intents (enter room, send, activity, ...). The
    /// runtime starts the engine itself and generates ticks.
    pub async fn run(self, mut commands: mpsc::Receiver<SyncEvent>) -> Result<(), RuntimeError> {
        let Self { mut executor, tick_interval, mut transport_rx, mut completion_rx } = self;

        executor.dispatch(SyncEvent::Start).await?;

        let mut ticker = tokio::time::interval(tick_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                command = commands.recv() => {
                    let Some(event) = command else {
                        break;
                    };
                    executor.dispatch(event).await?;
                },

                Some(event) = transport_rx.recv() => {
                    executor.handle_transport(event).await?;
                },

                Some(event) = completion_rx.recv() => {
                    executor.dispatch(event).await?;
                },

                _ = ticker.tick() => {
                    let now = executor.engine.env().now();
                    executor.dispatch(SyncEvent::Tick { now }).await?;
                },
            }
        }

        executor.dispatch(SyncEvent::Shutdown).await?;
        tracing::info!("runtime stopped");
        Ok(())
    }
}

impl<A: RestApi + 'static> Executor<A> {
    async fn dispatch(&mut self, event: SyncEvent) -> Result<(), RuntimeError> {
        let actions = self.engine.handle(event)?;
        self.execute(actions).await
    }

    async fn handle_transport(&mut self, event: TransportEvent) -> Result<(), RuntimeError> {
        let current = self.links.get(&event.address).map(TransportHandle::seq);
        if current != Some(event.seq) {
            tracing::trace!(address = %event.address, seq = event.seq, "ignoring superseded transport");
            return Ok(());
        }

        let address = event.address;
        let sync_event = match event.kind {
            TransportEventKind::Opened => SyncEvent::TransportOpened { address },
            TransportEventKind::Frame(text) => SyncEvent::FrameReceived { address, text },
            TransportEventKind::Closed => {
                self.links.remove(&address);
                SyncEvent::TransportClosed { address }
            },
        };
        self.dispatch(sync_event).await
    }

    async fn execute(&mut self, actions: Vec<SyncAction>) -> Result<(), RuntimeError> {
        for action in actions {
            match action {
                SyncAction::OpenTransport { address } => self.open(address),
                SyncAction::CloseTransport { address } => {
                    if let Some(link) = self.links.remove(&address) {
                        link.close();
                    }
                },
                SyncAction::SendFrame { address, text } => match self.links.get(&address) {
                    Some(link) => link.send(text),
                    None => tracing::debug!(%address, "no transport for outgoing frame"),
                },
                SyncAction::FetchHistory(request) => {
                    let api = Arc::clone(&self.api);
                    let completions = self.completion_tx.clone();
                    tokio::spawn(async move {
                        let result = api.fetch_history(request.room, request.limit, request.offset).await;
                        let _ = completions.send(SyncEvent::HistoryLoaded { request, result }).await;
                    });
                },
                SyncAction::PostMessage(request) => {
                    let api = Arc::clone(&self.api);
                    let completions = self.completion_tx.clone();
                    tokio::spawn(async move {
                        let result = api.send_message(request.room, &request.body, request.client_ref).await;
                        let _ = completions.send(SyncEvent::PostCompleted { request, result }).await;
                    });
                },
                SyncAction::MarkRead { room } => {
                    let api = Arc::clone(&self.api);
                    tokio::spawn(async move {
                        if let Err(err) = api.mark_read(room).await {
                            tracing::debug!(%room, %err, "mark read failed");
                        }
                    });
                },
                SyncAction::MessagesChanged => {
                    let messages = self.engine.chat().messages().to_vec();
                    self.publish(RuntimeUpdate::Messages(messages)).await?;
                },
                SyncAction::TypingChanged => {
                    let typing = self.engine.chat().typing().nicknames();
                    self.publish(RuntimeUpdate::Typing(typing)).await?;
                },
                SyncAction::PresenceChanged { user_ids } => {
                    let presence = self.engine.presence();
                    let records =
                        user_ids.iter().filter_map(|id| presence.record(*id)).cloned().collect();
                    self.publish(RuntimeUpdate::Presence(records)).await?;
                },
                SyncAction::NotificationPublished(notification) => {
                    self.publish(RuntimeUpdate::Notification(notification)).await?;
                },
                SyncAction::ScrollToBottom => self.publish(RuntimeUpdate::ScrollToBottom).await?,
                SyncAction::PreserveScrollAnchor => {
                    self.publish(RuntimeUpdate::PreserveScrollAnchor).await?;
                },
            }
        }
        Ok(())
    }

    fn open(&mut self, address: ChannelAddress) {
        if let Some(previous) = self.links.remove(&address) {
            previous.close();
        }

        let seq = self.next_seq;
        self.next_seq += 1;

        let url = address.url(&self.ws_base_url);
        tracing::debug!(%address, %url, seq, "opening transport");
        let link = transport::open(address, url, seq, self.transport_tx.clone());
        self.links.insert(address, link);
    }

    async fn publish(&self, update: RuntimeUpdate) -> Result<(), RuntimeError> {
        self.updates.send(update).await.map_err(|_| RuntimeError::UpdatesClosed)
    }
}
