//! Reconnect delay policy.
//!
//! Capped exponential backoff with additive jitter. The n-th consecutive
//! failure waits `min(base * 2^(n-1), max)` plus a random extra of up to
//! `jitter_percent` of that ceiling. Retries never stop; only the delay grows.

use std::time::Duration;

use crate::env::Environment;

/// Delay before the first reconnect attempt.
pub const DEFAULT_RECONNECT_BASE: Duration = Duration::from_secs(3);

/// Upper bound on the delay before jitter.
pub const DEFAULT_RECONNECT_MAX: Duration = Duration::from_secs(60);

/// Extra random delay, as a percentage of the capped delay.
pub const DEFAULT_JITTER_PERCENT: u32 = 20;

/// Doubling stops after this many failures; the cap takes over long before.
const MAX_SHIFT: u32 = 16;

/// Reconnect backoff configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    /// Delay after the first failure
    pub base: Duration,
    /// Cap on the exponential delay
    pub max: Duration,
    /// Random extra delay, percent of the capped delay (0 disables jitter)
    pub jitter_percent: u32,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base: DEFAULT_RECONNECT_BASE,
            max: DEFAULT_RECONNECT_MAX,
            jitter_percent: DEFAULT_JITTER_PERCENT,
        }
    }
}

impl Backoff {
    /// Same delay after every failure, no jitter.
    pub fn fixed(delay: Duration) -> Self {
        Self { base: delay, max: delay, jitter_percent: 0 }
    }

    /// Capped delay for the given consecutive failure count, before jitter.
    ///
    /// `failures` counts from 1; 0 is treated as 1.
    pub fn ceiling(&self, failures: u32) -> Duration {
        let shift = failures.saturating_sub(1).min(MAX_SHIFT);
        self.base.saturating_mul(1u32 << shift).min(self.max)
    }

    /// Delay to wait before the next attempt, jitter included.
    pub fn delay<E: Environment>(&self, failures: u32, env: &E) -> Duration {
        let ceiling = self.ceiling(failures);
        if self.jitter_percent == 0 {
            return ceiling;
        }

        let span_ms = (ceiling.as_millis() as u64).saturating_mul(u64::from(self.jitter_percent)) / 100;
        if span_ms == 0 {
            return ceiling;
        }

        ceiling + Duration::from_millis(env.random_u64() % (span_ms + 1))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;

    #[derive(Clone)]
    struct FixedRandomEnv(u64);

    impl Environment for FixedRandomEnv {
        type Instant = Instant;

        fn now(&self) -> Instant {
            Instant::now()
        }

        fn sleep(&self, _duration: Duration) -> impl std::future::Future<Output = ()> + Send {
            async {}
        }

        fn random_bytes(&self, buffer: &mut [u8]) {
            let bytes = self.0.to_be_bytes();
            for (i, byte) in buffer.iter_mut().enumerate() {
                *byte = bytes[i % bytes.len()];
            }
        }

        fn wall_clock_millis(&self) -> i64 {
            0
        }
    }

    #[test]
    fn doubles_until_cap() {
        let backoff = Backoff { jitter_percent: 0, ..Backoff::default() };

        assert_eq!(backoff.ceiling(1), Duration::from_secs(3));
        assert_eq!(backoff.ceiling(2), Duration::from_secs(6));
        assert_eq!(backoff.ceiling(3), Duration::from_secs(12));
        assert_eq!(backoff.ceiling(5), Duration::from_secs(48));
        assert_eq!(backoff.ceiling(6), Duration::from_secs(60));
        assert_eq!(backoff.ceiling(u32::MAX), Duration::from_secs(60));
    }

    #[test]
    fn zero_failures_uses_base() {
        assert_eq!(Backoff::default().ceiling(0), DEFAULT_RECONNECT_BASE);
    }

    #[test]
    fn fixed_policy_ignores_failure_count() {
        let backoff = Backoff::fixed(Duration::from_secs(3));
        let env = FixedRandomEnv(u64::MAX);

        for failures in 1..50 {
            assert_eq!(backoff.delay(failures, &env), Duration::from_secs(3));
        }
    }

    #[test]
    fn jitter_stays_within_percentage() {
        let backoff = Backoff::default();

        for seed in [0, 1, 599, 600, 601, u64::MAX] {
            let delay = backoff.delay(1, &FixedRandomEnv(seed));
            assert!(delay >= Duration::from_secs(3));
            assert!(delay <= Duration::from_millis(3600), "delay {delay:?} for seed {seed}");
        }
    }
}
