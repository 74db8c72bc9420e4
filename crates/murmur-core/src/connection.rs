//! Channel lifecycle state machine.
//!
//! Manages connect, heartbeat, close and reconnect for one channel address.
//! Uses the action pattern: methods take time as input and return actions for
//! the driver to execute. Transport errors are only ever reported back as
//! [`ChannelConnection::handle_closed`]; nothing is surfaced to senders.
//!
//! # State Machine
//!
//! ```text
//!                open()                 opened
//! ┌──────────────┐ ──────> ┌────────────┐ ──────> ┌───────────┐
//! │ Disconnected │         │ Connecting │         │ Connected │
//! └──────────────┘ <────── └────────────┘ <────── └───────────┘
//!     │      ^      closed  (reconnect armed)  closed  │
//!     │      │                                         │ heartbeat
//!     └──────┘ reconnect deadline -> Connecting        └─────────┘
//! ```
//!
//! # Invariants
//!
//! - At most one of {heartbeat timer, reconnect timer} is armed.
//! - The heartbeat timer is armed only while Connected.
//! - After `close()`, no further reconnect is scheduled until `open()`.

use std::{
    collections::BTreeMap,
    ops::Sub,
    time::{Duration, Instant},
};

use murmur_proto::{ChannelAddress, OutboundFrame};

use crate::{backoff::Backoff, env::Environment};

/// Interval at which a connected channel sends heartbeat frames.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Actions returned by the connection state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelAction {
    /// Open a transport to this address
    OpenTransport {
        /// Address to connect to
        address: ChannelAddress,
    },

    /// Send this frame on the open transport
    SendFrame {
        /// Channel to send on
        address: ChannelAddress,
        /// Frame to send
        frame: OutboundFrame,
    },

    /// Close the transport for this address
    CloseTransport {
        /// Channel to close
        address: ChannelAddress,
    },
}

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// No transport; a reconnect may be pending
    Disconnected,
    /// Transport open requested, not yet confirmed
    Connecting,
    /// Transport open; frames flow
    Connected,
}

/// Connection configuration
#[derive(Debug, Clone, Copy)]
pub struct ConnectionConfig {
    /// Heartbeat interval while connected
    pub heartbeat_interval: Duration,
    /// Reconnect delay policy
    pub backoff: Backoff,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self { heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL, backoff: Backoff::default() }
    }
}

/// Pending reconnect: armed at `since`, fires once `delay` has elapsed.
#[derive(Debug, Clone, Copy)]
struct ReconnectTimer<I> {
    since: I,
    delay: Duration,
}

/// Channel connection state machine
///
/// This is a pure state machine - no I/O, no Environment storage.
/// Time is passed as parameters to methods that need it.
#[derive(Debug, Clone)]
pub struct ChannelConnection<I = Instant>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    address: ChannelAddress,
    state: ChannelState,
    config: ConnectionConfig,
    /// Last heartbeat (or connect) time; `Some` only while Connected
    heartbeat_since: Option<I>,
    /// `Some` only while Disconnected after a failure
    reconnect: Option<ReconnectTimer<I>>,
    /// Consecutive failed or dropped connections
    failures: u32,
    /// Set by `close()`; suppresses reconnects
    closed_by_owner: bool,
    /// Frames replayed on every (re)connect, keyed by wire type
    durable: BTreeMap<&'static str, OutboundFrame>,
}

impl<I> ChannelConnection<I>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    /// Create a connection in [`ChannelState::Disconnected`] with no timers.
    pub fn new(address: ChannelAddress, config: ConnectionConfig) -> Self {
        Self {
            address,
            state: ChannelState::Disconnected,
            config,
            heartbeat_since: None,
            reconnect: None,
            failures: 0,
            closed_by_owner: false,
            durable: BTreeMap::new(),
        }
    }

    /// Address this connection targets.
    pub fn address(&self) -> ChannelAddress {
        self.address
    }

    /// Current state.
    pub fn state(&self) -> ChannelState {
        self.state
    }

    /// True while frames can be sent.
    pub fn is_connected(&self) -> bool {
        self.state == ChannelState::Connected
    }

    /// Consecutive failures since the last successful open.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Whether the heartbeat timer is armed.
    pub fn heartbeat_armed(&self) -> bool {
        self.heartbeat_since.is_some()
    }

    /// Whether a reconnect is pending.
    pub fn reconnect_armed(&self) -> bool {
        self.reconnect.is_some()
    }

    /// Delay of the pending reconnect, if any.
    pub fn reconnect_delay(&self) -> Option<Duration> {
        self.reconnect.map(|timer| timer.delay)
    }

    /// Register a frame to replay on every (re)connect.
    ///
    /// Replaces any earlier durable frame of the same wire type. Does not send
    /// the frame now; callers send it separately if connected.
    pub fn set_durable(&mut self, frame: OutboundFrame) {
        self.durable.insert(frame.kind(), frame);
    }

    /// Start connecting.
    ///
    /// No-op while Connecting or Connected. Otherwise cancels any pending
    /// reconnect and returns `OpenTransport`.
    pub fn open(&mut self) -> Vec<ChannelAction> {
        if self.state != ChannelState::Disconnected {
            return Vec::new();
        }

        self.closed_by_owner = false;
        self.reconnect = None;
        self.state = ChannelState::Connecting;
        self.check_timers();

        vec![ChannelAction::OpenTransport { address: self.address }]
    }

    /// Transport opened successfully.
    ///
    /// Transitions to Connected, arms the heartbeat and replays durable
    /// frames. Ignored unless Connecting (a stale open after `close()`).
    pub fn handle_opened(&mut self, now: I) -> Vec<ChannelAction> {
        if self.state != ChannelState::Connecting {
            tracing::debug!(address = %self.address, state = ?self.state, "ignoring stale open");
            return Vec::new();
        }

        self.state = ChannelState::Connected;
        self.failures = 0;
        self.heartbeat_since = Some(now);
        self.check_timers();

        tracing::info!(address = %self.address, "channel connected");

        self.durable
            .values()
            .map(|frame| ChannelAction::SendFrame { address: self.address, frame: frame.clone() })
            .collect()
    }

    /// Transport closed, failed to open, or errored.
    ///
    /// Clears the heartbeat and schedules a reconnect unless the owner closed
    /// the channel.
    pub fn handle_closed<E: Environment>(&mut self, env: &E, now: I) {
        if self.closed_by_owner || self.state == ChannelState::Disconnected {
            return;
        }

        self.state = ChannelState::Disconnected;
        self.heartbeat_since = None;
        self.failures = self.failures.saturating_add(1);

        let delay = self.config.backoff.delay(self.failures, env);
        self.reconnect = Some(ReconnectTimer { since: now, delay });
        self.check_timers();

        tracing::warn!(
            address = %self.address,
            failures = self.failures,
            delay_ms = delay.as_millis() as u64,
            "channel closed, reconnect scheduled"
        );
    }

    /// Send a frame. Silently dropped unless Connected.
    pub fn send(&mut self, frame: OutboundFrame) -> Vec<ChannelAction> {
        if self.state != ChannelState::Connected {
            tracing::debug!(address = %self.address, kind = frame.kind(), "dropping frame, not connected");
            return Vec::new();
        }

        vec![ChannelAction::SendFrame { address: self.address, frame }]
    }

    /// Close permanently: cancel reconnect, clear heartbeat, close transport.
    pub fn close(&mut self) -> Vec<ChannelAction> {
        let had_transport = self.state != ChannelState::Disconnected;

        self.closed_by_owner = true;
        self.state = ChannelState::Disconnected;
        self.heartbeat_since = None;
        self.reconnect = None;
        self.check_timers();

        if had_transport {
            tracing::info!(address = %self.address, "channel closed by owner");
            vec![ChannelAction::CloseTransport { address: self.address }]
        } else {
            Vec::new()
        }
    }

    /// Process timers: heartbeats while connected, reconnect when due.
    pub fn tick(&mut self, now: I) -> Vec<ChannelAction> {
        let mut actions = Vec::new();

        match self.state {
            ChannelState::Connected => {
                if let Some(since) = self.heartbeat_since {
                    if now - since >= self.config.heartbeat_interval {
                        self.heartbeat_since = Some(now);
                        actions.push(ChannelAction::SendFrame {
                            address: self.address,
                            frame: OutboundFrame::Heartbeat,
                        });
                    }
                }
            },
            ChannelState::Disconnected => {
                if let Some(timer) = self.reconnect {
                    if now - timer.since >= timer.delay {
                        self.reconnect = None;
                        self.state = ChannelState::Connecting;
                        tracing::info!(address = %self.address, attempt = self.failures + 1, "reconnecting");
                        actions.push(ChannelAction::OpenTransport { address: self.address });
                    }
                }
            },
            ChannelState::Connecting => {},
        }

        self.check_timers();
        actions
    }

    fn check_timers(&self) {
        debug_assert!(
            !(self.heartbeat_since.is_some() && self.reconnect.is_some()),
            "heartbeat and reconnect timers armed together on {}",
            self.address
        );
        debug_assert!(self.heartbeat_since.is_none() || self.state == ChannelState::Connected);
        debug_assert!(self.reconnect.is_none() || self.state == ChannelState::Disconnected);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone)]
    struct TestEnv;

    impl Environment for TestEnv {
        type Instant = Instant;

        fn now(&self) -> Instant {
            Instant::now()
        }

        fn sleep(&self, _duration: Duration) -> impl std::future::Future<Output = ()> + Send {
            async {}
        }

        fn random_bytes(&self, buffer: &mut [u8]) {
            // Deterministic for tests
            for (i, byte) in buffer.iter_mut().enumerate() {
                *byte = i as u8;
            }
        }

        fn wall_clock_millis(&self) -> i64 {
            0
        }
    }

    fn fixed_config() -> ConnectionConfig {
        ConnectionConfig { backoff: Backoff::fixed(Duration::from_secs(3)), ..Default::default() }
    }

    fn connected(t0: Instant) -> ChannelConnection {
        let mut conn = ChannelConnection::new(ChannelAddress::Global, fixed_config());
        conn.open();
        conn.handle_opened(t0);
        conn
    }

    #[test]
    fn open_requests_transport_once() {
        let mut conn: ChannelConnection = ChannelConnection::new(ChannelAddress::Global, fixed_config());

        let actions = conn.open();
        assert_eq!(actions, vec![ChannelAction::OpenTransport { address: ChannelAddress::Global }]);
        assert_eq!(conn.state(), ChannelState::Connecting);

        assert!(conn.open().is_empty());
    }

    #[test]
    fn open_while_connected_is_noop() {
        let t0 = Instant::now();
        let mut conn = connected(t0);

        assert!(conn.open().is_empty());
        assert!(conn.is_connected());
    }

    #[test]
    fn heartbeat_sent_each_interval() {
        let t0 = Instant::now();
        let mut conn = connected(t0);

        assert!(conn.tick(t0 + Duration::from_secs(29)).is_empty());

        let actions = conn.tick(t0 + Duration::from_secs(30));
        assert_eq!(actions, vec![ChannelAction::SendFrame {
            address: ChannelAddress::Global,
            frame: OutboundFrame::Heartbeat,
        }]);

        assert!(conn.tick(t0 + Duration::from_secs(45)).is_empty());
        assert_eq!(conn.tick(t0 + Duration::from_secs(60)).len(), 1);
    }

    #[test]
    fn send_dropped_unless_connected() {
        let mut conn: ChannelConnection = ChannelConnection::new(ChannelAddress::Global, fixed_config());
        assert!(conn.send(OutboundFrame::Typing).is_empty());

        conn.open();
        assert!(conn.send(OutboundFrame::Typing).is_empty());

        conn.handle_opened(Instant::now());
        assert_eq!(conn.send(OutboundFrame::Typing).len(), 1);
    }

    #[test]
    fn close_event_schedules_reconnect() {
        let t0 = Instant::now();
        let mut conn = connected(t0);

        conn.handle_closed(&TestEnv, t0);
        assert_eq!(conn.state(), ChannelState::Disconnected);
        assert!(!conn.heartbeat_armed());
        assert!(conn.reconnect_armed());
        assert_eq!(conn.reconnect_delay(), Some(Duration::from_secs(3)));

        assert!(conn.tick(t0 + Duration::from_millis(2999)).is_empty());

        let actions = conn.tick(t0 + Duration::from_secs(3));
        assert_eq!(actions, vec![ChannelAction::OpenTransport { address: ChannelAddress::Global }]);
        assert_eq!(conn.state(), ChannelState::Connecting);
        assert!(!conn.reconnect_armed());
    }

    #[test]
    fn failed_open_also_reconnects() {
        let t0 = Instant::now();
        let mut conn: ChannelConnection = ChannelConnection::new(ChannelAddress::Global, fixed_config());
        conn.open();

        conn.handle_closed(&TestEnv, t0);
        assert!(conn.reconnect_armed());
        assert_eq!(conn.failures(), 1);
    }

    #[test]
    fn reconnect_resets_failures() {
        let t0 = Instant::now();
        let mut conn = connected(t0);

        conn.handle_closed(&TestEnv, t0);
        conn.tick(t0 + Duration::from_secs(3));
        conn.handle_closed(&TestEnv, t0 + Duration::from_secs(3));
        assert_eq!(conn.failures(), 2);

        conn.tick(t0 + Duration::from_secs(6));
        conn.handle_opened(t0 + Duration::from_secs(6));
        assert_eq!(conn.failures(), 0);
        assert!(conn.heartbeat_armed());
    }

    #[test]
    fn owner_close_stops_reconnecting() {
        let t0 = Instant::now();
        let mut conn = connected(t0);

        let actions = conn.close();
        assert_eq!(actions, vec![ChannelAction::CloseTransport { address: ChannelAddress::Global }]);

        // The transport reports its own close afterwards
        conn.handle_closed(&TestEnv, t0);
        assert!(!conn.reconnect_armed());
        assert!(conn.tick(t0 + Duration::from_secs(3600)).is_empty());
    }

    #[test]
    fn close_cancels_pending_reconnect() {
        let t0 = Instant::now();
        let mut conn = connected(t0);
        conn.handle_closed(&TestEnv, t0);

        assert!(conn.close().is_empty());
        assert!(!conn.reconnect_armed());
        assert!(conn.tick(t0 + Duration::from_secs(10)).is_empty());
    }

    #[test]
    fn durable_frames_replayed_on_every_connect() {
        let t0 = Instant::now();
        let mut conn = connected(t0);
        let subscribe = OutboundFrame::SubscribePresence { user_ids: vec![1, 2] };
        conn.set_durable(subscribe.clone());

        for round in 1..=3u64 {
            let now = t0 + Duration::from_secs(10 * round);
            conn.handle_closed(&TestEnv, now);
            conn.tick(now + Duration::from_secs(3));
            let actions = conn.handle_opened(now + Duration::from_secs(3));
            assert_eq!(actions, vec![ChannelAction::SendFrame {
                address: ChannelAddress::Global,
                frame: subscribe.clone(),
            }]);
        }
    }

    #[test]
    fn durable_frame_of_same_type_is_replaced() {
        let mut conn: ChannelConnection = ChannelConnection::new(ChannelAddress::Global, fixed_config());
        conn.set_durable(OutboundFrame::SubscribePresence { user_ids: vec![1] });
        conn.set_durable(OutboundFrame::SubscribePresence { user_ids: vec![1, 2] });

        conn.open();
        assert_eq!(conn.handle_opened(Instant::now()), vec![ChannelAction::SendFrame {
            address: ChannelAddress::Global,
            frame: OutboundFrame::SubscribePresence { user_ids: vec![1, 2] },
        }]);
    }

    #[test]
    fn stale_open_after_close_is_ignored() {
        let mut conn: ChannelConnection = ChannelConnection::new(ChannelAddress::Global, fixed_config());
        conn.open();
        conn.close();

        assert!(conn.handle_opened(Instant::now()).is_empty());
        assert_eq!(conn.state(), ChannelState::Disconnected);
        assert!(!conn.heartbeat_armed());
    }
}
