//! Simulation driver.
//!
//! `SimDriver` executes [`SyncAction`]s synchronously against a [`SimServer`]
//! and a [`SimEnv`], so a whole session (connects, drops, REST calls, echoes)
//! replays deterministically. It is the in-process counterpart of the tokio
//! `Runtime` in `murmur-client`.
//!
//! By default transports open as soon as the engine asks, channel messages are
//! stored and echoed back with their correlation ref, and REST results are fed
//! back immediately. [`DriverOptions`] turns each of these off for tests that
//! need to control the interleaving.

use std::{
    collections::{BTreeSet, VecDeque},
    time::Duration,
};

use murmur_client::{ApiError, Identity, SyncAction, SyncConfig, SyncEngine, SyncError, SyncEvent};
use murmur_core::env::Environment;
use murmur_proto::{ChannelAddress, InboundFrame, OutboundFrame, RoomKey, decode, encode};

use crate::{
    invariants::{ClientSnapshot, InvariantRegistry, SystemSnapshot},
    sim_env::{SimEnv, SimInstant},
    sim_server::SimServer,
};

/// Driver behavior switches.
#[derive(Debug, Clone, Copy)]
pub struct DriverOptions {
    /// Open transports as soon as the engine asks
    pub auto_open: bool,
    /// Store and echo channel messages
    pub echo_messages: bool,
    /// Include the correlation ref in echoes
    pub echo_client_ref: bool,
    /// Hold REST results until [`SimDriver::release_held`]
    pub hold_rest: bool,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self { auto_open: true, echo_messages: true, echo_client_ref: true, hold_rest: false }
    }
}

/// Simulation driver for deterministic testing.
pub struct SimDriver {
    env: SimEnv,
    engine: SyncEngine<SimEnv>,
    server: SimServer,
    options: DriverOptions,

    /// Transports currently open from the server's point of view
    open: BTreeSet<ChannelAddress>,

    /// Events waiting to be fed to the engine
    pending: VecDeque<SyncEvent<SimInstant>>,

    /// REST results held back by `hold_rest`
    held: Vec<SyncEvent<SimInstant>>,

    /// Frames written by the engine, with their address
    sent: Vec<(ChannelAddress, OutboundFrame)>,

    /// Every `OpenTransport` request, in order
    open_requests: Vec<ChannelAddress>,

    /// Every `CloseTransport` request, in order
    close_requests: Vec<ChannelAddress>,

    /// UI notifications, in order
    ui: Vec<SyncAction>,

    invariants: Option<InvariantRegistry>,
}

impl SimDriver {
    /// Driver for `identity` with default configuration and options.
    pub fn new(identity: Identity) -> Self {
        Self::with_config(identity, SyncConfig::default(), SimEnv::new())
    }

    /// Driver with explicit engine configuration and environment.
    pub fn with_config(identity: Identity, config: SyncConfig, env: SimEnv) -> Self {
        let server = SimServer::new(identity.user_id);
        Self {
            engine: SyncEngine::new(env.clone(), identity, config),
            env,
            server,
            options: DriverOptions::default(),
            open: BTreeSet::new(),
            pending: VecDeque::new(),
            held: Vec::new(),
            sent: Vec::new(),
            open_requests: Vec::new(),
            close_requests: Vec::new(),
            ui: Vec::new(),
            invariants: None,
        }
    }

    /// Replace the driver options.
    #[must_use]
    pub fn with_options(mut self, options: DriverOptions) -> Self {
        self.options = options;
        self
    }

    /// Check invariants after every event.
    #[must_use]
    pub fn with_invariants(mut self, registry: InvariantRegistry) -> Self {
        self.invariants = Some(registry);
        self
    }

    /// Engine under test.
    pub fn engine(&self) -> &SyncEngine<SimEnv> {
        &self.engine
    }

    /// Simulated server.
    pub fn server(&self) -> &SimServer {
        &self.server
    }

    /// Simulated environment.
    pub fn env(&self) -> &SimEnv {
        &self.env
    }

    /// Change options mid-run.
    pub fn options_mut(&mut self) -> &mut DriverOptions {
        &mut self.options
    }

    /// Whether the transport for `address` is open.
    pub fn is_open(&self, address: ChannelAddress) -> bool {
        self.open.contains(&address)
    }

    /// Feed an event and run until no follow-up events remain.
    pub fn dispatch(&mut self, event: SyncEvent<SimInstant>) -> Result<(), SyncError> {
        self.pending.push_back(event);
        self.run_pending()
    }

    /// Start the engine.
    pub fn start(&mut self) -> Result<(), SyncError> {
        self.dispatch(SyncEvent::Start)
    }

    /// Enter `room`.
    pub fn enter_room(&mut self, room: RoomKey) -> Result<(), SyncError> {
        self.dispatch(SyncEvent::EnterRoom { room })
    }

    /// Send a chat message.
    pub fn send_message(&mut self, text: &str) -> Result<(), SyncError> {
        self.dispatch(SyncEvent::SendMessage { text: text.to_string() })
    }

    /// Advance the virtual clock and deliver one tick.
    pub fn advance(&mut self, duration: Duration) -> Result<(), SyncError> {
        self.env.advance(duration);
        let now = self.env.now();
        self.dispatch(SyncEvent::Tick { now })
    }

    /// Advance `total` in ticks of `step`.
    pub fn run_for(&mut self, total: Duration, step: Duration) -> Result<(), SyncError> {
        let mut elapsed = Duration::ZERO;
        while elapsed < total {
            let next = step.min(total - elapsed);
            self.advance(next)?;
            elapsed += next;
        }
        Ok(())
    }

    /// Open a transport the engine asked for (with `auto_open` off).
    pub fn open_transport(&mut self, address: ChannelAddress) -> Result<(), SyncError> {
        self.open.insert(address);
        self.dispatch(SyncEvent::TransportOpened { address })
    }

    /// Report a transport failure or server hangup on `address`.
    pub fn drop_connection(&mut self, address: ChannelAddress) -> Result<(), SyncError> {
        tracing::debug!(%address, "sim: dropping connection");
        self.open.remove(&address);
        self.dispatch(SyncEvent::TransportClosed { address })
    }

    /// Deliver an inbound frame on `address`.
    pub fn deliver(&mut self, address: ChannelAddress, frame: &InboundFrame) -> Result<(), SyncError> {
        let text = encode(frame)?;
        self.deliver_raw(address, text)
    }

    /// Deliver raw text on `address`.
    pub fn deliver_raw(&mut self, address: ChannelAddress, text: impl Into<String>) -> Result<(), SyncError> {
        self.dispatch(SyncEvent::FrameReceived { address, text: text.into() })
    }

    /// Feed every held REST result, in issue order.
    pub fn release_held(&mut self) -> Result<(), SyncError> {
        let held = std::mem::take(&mut self.held);
        self.pending.extend(held);
        self.run_pending()
    }

    /// Feed held REST results newest first.
    pub fn release_held_reversed(&mut self) -> Result<(), SyncError> {
        let held = std::mem::take(&mut self.held);
        self.pending.extend(held.into_iter().rev());
        self.run_pending()
    }

    /// Number of held REST results.
    pub fn held_count(&self) -> usize {
        self.held.len()
    }

    /// Take frames sent on `address`.
    pub fn take_sent(&mut self, address: ChannelAddress) -> Vec<OutboundFrame> {
        let (taken, kept): (Vec<_>, Vec<_>) =
            std::mem::take(&mut self.sent).into_iter().partition(|(a, _)| *a == address);
        self.sent = kept;
        taken.into_iter().map(|(_, frame)| frame).collect()
    }

    /// Take every sent frame.
    pub fn take_all_sent(&mut self) -> Vec<(ChannelAddress, OutboundFrame)> {
        std::mem::take(&mut self.sent)
    }

    /// Take UI notifications.
    pub fn take_ui(&mut self) -> Vec<SyncAction> {
        std::mem::take(&mut self.ui)
    }

    /// `OpenTransport` requests so far.
    pub fn open_requests(&self) -> &[ChannelAddress] {
        &self.open_requests
    }

    /// `CloseTransport` requests so far.
    pub fn close_requests(&self) -> &[ChannelAddress] {
        &self.close_requests
    }

    /// Observable engine state.
    pub fn snapshot(&self) -> SystemSnapshot {
        SystemSnapshot::single(ClientSnapshot::from_engine(&self.engine))
    }

    /// Check invariants if enabled.
    pub fn check_invariants(&self, context: &str) {
        if let Some(ref registry) = self.invariants {
            registry.assert_all(&self.snapshot(), context);
        }
    }

    fn run_pending(&mut self) -> Result<(), SyncError> {
        while let Some(event) = self.pending.pop_front() {
            let context = format!("after {event:?}");
            let actions = self.engine.handle(event)?;
            for action in actions {
                self.execute(action)?;
            }
            self.check_invariants(&context);
        }
        Ok(())
    }

    fn execute(&mut self, action: SyncAction) -> Result<(), SyncError> {
        match action {
            SyncAction::OpenTransport { address } => {
                self.open_requests.push(address);
                if self.options.auto_open {
                    self.open.insert(address);
                    self.pending.push_back(SyncEvent::TransportOpened { address });
                }
            },
            SyncAction::CloseTransport { address } => {
                self.close_requests.push(address);
                self.open.remove(&address);
            },
            SyncAction::SendFrame { address, text } => {
                let frame: OutboundFrame = decode(&text)?;
                if let (OutboundFrame::Message { message, client_ref }, Some(room)) =
                    (&frame, address.room_key())
                {
                    self.echo(address, room, message, *client_ref)?;
                }
                self.sent.push((address, frame));
            },
            SyncAction::FetchHistory(request) => {
                let result = if self.server.fails_history() {
                    Err(ApiError::Http("connection refused".to_string()))
                } else {
                    Ok(self.server.history(request.room, request.limit, request.offset))
                };
                self.complete(SyncEvent::HistoryLoaded { request, result });
            },
            SyncAction::PostMessage(request) => {
                let result = if self.server.fails_posts() {
                    Err(ApiError::Status { status: 503, body: "unavailable".to_string() })
                } else {
                    let user_id = self.engine.identity().user_id;
                    Ok(self.server.post(request.room, user_id, &request.body, Some(request.client_ref)))
                };
                self.complete(SyncEvent::PostCompleted { request, result });
            },
            SyncAction::MarkRead { room } => self.server.mark_read(room),
            ui => self.ui.push(ui),
        }
        Ok(())
    }

    fn echo(
        &mut self,
        address: ChannelAddress,
        room: RoomKey,
        message: &str,
        client_ref: Option<u64>,
    ) -> Result<(), SyncError> {
        if !self.options.echo_messages {
            return Ok(());
        }

        let user_id = self.engine.identity().user_id;
        let mut record = self.server.post(room, user_id, message, client_ref);
        if !self.options.echo_client_ref {
            record.client_ref = None;
        }

        let text = encode(&InboundFrame::Message(record))?;
        self.pending.push_back(SyncEvent::FrameReceived { address, text });
        Ok(())
    }

    fn complete(&mut self, event: SyncEvent<SimInstant>) {
        if self.options.hold_rest {
            tracing::trace!(held = self.held.len() + 1, "sim: holding rest result");
            self.held.push(event);
        } else {
            self.pending.push_back(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROOM: RoomKey = RoomKey { workspace_id: 1, room_id: 1 };

    fn driver() -> SimDriver {
        SimDriver::new(Identity::new(1, "me")).with_invariants(InvariantRegistry::standard())
    }

    #[test]
    fn start_connects_global() {
        let mut driver = driver();
        driver.start().unwrap();

        assert!(driver.is_open(ChannelAddress::Global));
        assert!(driver.engine().channels().is_connected(&ChannelAddress::Global));
    }

    #[test]
    fn entering_room_loads_history() {
        let mut driver = driver();
        driver.server().seed_room(ROOM, 2, 5);
        driver.start().unwrap();

        driver.enter_room(ROOM).unwrap();

        assert_eq!(driver.engine().chat().messages().len(), 5);
        assert!(driver.take_ui().contains(&SyncAction::ScrollToBottom));
    }

    #[test]
    fn sent_message_is_echoed_once() {
        let mut driver = driver();
        driver.start().unwrap();
        driver.enter_room(ROOM).unwrap();

        driver.send_message("hello").unwrap();

        let messages = driver.engine().chat().messages();
        assert_eq!(messages.len(), 1);
        assert!(!messages[0].is_optimistic());
        assert_eq!(driver.server().message_count(ROOM), 1);
    }

    #[test]
    fn held_results_wait_for_release() {
        let mut driver = driver().with_options(DriverOptions { hold_rest: true, ..DriverOptions::default() });
        driver.server().seed_room(ROOM, 2, 3);
        driver.start().unwrap();
        driver.enter_room(ROOM).unwrap();

        assert_eq!(driver.held_count(), 1);
        assert!(driver.engine().chat().messages().is_empty());

        driver.release_held().unwrap();
        assert_eq!(driver.engine().chat().messages().len(), 3);
    }
}
