//! Property-based tests for the channel connection state machine.
//!
//! Drives a connection with arbitrary interleavings of owner calls, transport
//! events and clock advances, checking the timer and reconnect invariants after
//! every step.

#![allow(clippy::disallowed_types, reason = "Synchronous locking in test env only")]

use std::{
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use murmur_core::{
    Backoff, ChannelAction, ChannelConnection, ChannelState, ConnectionConfig, Environment,
};
use murmur_proto::{ChannelAddress, OutboundFrame};
use proptest::prelude::*;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

#[derive(Clone)]
struct SeededEnv {
    rng: Arc<Mutex<ChaCha8Rng>>,
}

impl SeededEnv {
    fn new(seed: u64) -> Self {
        Self { rng: Arc::new(Mutex::new(ChaCha8Rng::seed_from_u64(seed))) }
    }
}

impl Environment for SeededEnv {
    type Instant = Instant;

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, _duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        async {}
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        self.rng.lock().unwrap().fill_bytes(buffer);
    }

    fn wall_clock_millis(&self) -> i64 {
        0
    }
}

#[derive(Debug, Clone)]
enum Step {
    Open,
    Opened,
    Closed,
    Send,
    Close,
    Advance(u64),
}

fn arbitrary_step() -> impl Strategy<Value = Step> {
    prop_oneof![
        1 => Just(Step::Open),
        3 => Just(Step::Opened),
        3 => Just(Step::Closed),
        1 => Just(Step::Send),
        1 => Just(Step::Close),
        4 => (0u64..90_000).prop_map(Step::Advance),
    ]
}

proptest! {
    #[test]
    fn timers_never_armed_together(
        seed in any::<u64>(),
        steps in prop::collection::vec(arbitrary_step(), 1..80),
    ) {
        let env = SeededEnv::new(seed);
        let t0 = Instant::now();
        let mut now = t0;
        let mut conn: ChannelConnection = ChannelConnection::new(ChannelAddress::Global, ConnectionConfig::default());
        let mut owner_closed = false;

        for step in steps {
            let actions = match step {
                Step::Open => {
                    owner_closed = false;
                    conn.open()
                },
                Step::Opened => conn.handle_opened(now),
                Step::Closed => {
                    conn.handle_closed(&env, now);
                    Vec::new()
                },
                Step::Send => conn.send(OutboundFrame::Typing),
                Step::Close => {
                    owner_closed = true;
                    conn.close()
                },
                Step::Advance(ms) => {
                    now += Duration::from_millis(ms);
                    conn.tick(now)
                },
            };

            prop_assert!(!(conn.heartbeat_armed() && conn.reconnect_armed()));
            prop_assert_eq!(conn.heartbeat_armed(), conn.state() == ChannelState::Connected);

            if owner_closed {
                prop_assert!(!conn.reconnect_armed());
                let no_open_transport = actions.iter().all(|a| !matches!(a, ChannelAction::OpenTransport { .. }));
                prop_assert!(no_open_transport);
            }

            if let Some(delay) = conn.reconnect_delay() {
                prop_assert!(delay >= Duration::from_secs(3));
                prop_assert!(delay <= Duration::from_secs(72));
            }
        }
    }

    #[test]
    fn always_eventually_reconnects(seed in any::<u64>(), drops in 1usize..30) {
        let env = SeededEnv::new(seed);
        let mut now = Instant::now();
        let mut conn: ChannelConnection = ChannelConnection::new(ChannelAddress::Global, ConnectionConfig::default());
        conn.open();

        for _ in 0..drops {
            conn.handle_closed(&env, now);
            let delay = conn.reconnect_delay().unwrap();
            now += delay;
            let actions = conn.tick(now);
            prop_assert_eq!(actions, vec![ChannelAction::OpenTransport { address: ChannelAddress::Global }]);
        }

        conn.handle_opened(now);
        prop_assert!(conn.is_connected());
        prop_assert_eq!(conn.failures(), 0);
    }

    #[test]
    fn fixed_backoff_waits_exactly_the_delay(drops in 1usize..20) {
        let env = SeededEnv::new(7);
        let config = ConnectionConfig { backoff: Backoff::fixed(Duration::from_secs(3)), ..Default::default() };
        let mut now = Instant::now();
        let mut conn: ChannelConnection = ChannelConnection::new(ChannelAddress::Global, config);
        conn.open();

        for _ in 0..drops {
            conn.handle_closed(&env, now);
            prop_assert!(conn.tick(now + Duration::from_millis(2999)).is_empty());
            now += Duration::from_secs(3);
            prop_assert_eq!(conn.tick(now).len(), 1);
        }
    }
}
