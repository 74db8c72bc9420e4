//! Host clock and OS randomness for the tokio runtime.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use murmur_core::env::Environment;

/// [`Environment`] backed by the host.
///
/// # Panics
///
/// `random_bytes` panics if the OS RNG is unavailable and
/// `wall_clock_millis` panics if the clock reads before 1970. Neither host
/// can run the client.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Host environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    type Instant = Instant;

    #[allow(clippy::disallowed_methods)]
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }

    #[allow(clippy::expect_used)]
    fn random_bytes(&self, buffer: &mut [u8]) {
        getrandom::fill(buffer).expect("invariant: OS RNG available");
    }

    #[allow(clippy::disallowed_methods)]
    #[allow(clippy::expect_used)]
    fn wall_clock_millis(&self) -> i64 {
        let since_epoch =
            SystemTime::now().duration_since(UNIX_EPOCH).expect("invariant: host clock after 1970");
        since_epoch.as_millis() as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wall_clock_is_usable_as_optimistic_id() {
        let env = SystemEnv::new();
        let first = env.wall_clock_millis();
        // 2020-01-01T00:00:00Z
        assert!(first > 1_577_836_800_000);
        assert!(env.wall_clock_millis() >= first);
    }

    #[test]
    fn jitter_source_is_not_constant() {
        let env = SystemEnv::new();
        let draws: Vec<u64> = (0..4).map(|_| env.random_u64()).collect();
        assert!(draws.windows(2).any(|w| w[0] != w[1]));
    }

    #[tokio::test]
    async fn sleep_uses_the_tokio_timer() {
        let env = SystemEnv::new();
        let start = env.now();
        env.sleep(Duration::from_millis(20)).await;
        assert!(env.now() - start >= Duration::from_millis(20));
    }
}
