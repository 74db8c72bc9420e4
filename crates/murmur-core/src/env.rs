//! Clocks and randomness behind one trait.
//!
//! Reconnect jitter, heartbeat deadlines and optimistic message ids all come
//! from an [`Environment`]. Production passes the system clock; the harness
//! passes a virtual clock with a seeded RNG so sessions replay exactly.

use std::time::Duration;

/// Source of time and randomness for the sync engine.
///
/// `now()` must be monotonic. A seeded implementation must yield the same
/// random sequence for the same seed.
pub trait Environment: Clone + Send + Sync + 'static {
    /// Monotonic instant; `std::time::Instant` in production.
    type Instant: Copy + Ord + Send + Sync + std::ops::Sub<Output = Duration>;

    /// Monotonic now.
    fn now(&self) -> Self::Instant;

    /// Wait `duration`. Drivers only; state machines take `now` instead.
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send;

    /// Fill `buffer` with random bytes.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Wall-clock time as Unix milliseconds.
    ///
    /// Used for optimistic message ids and local presence timestamps. Not
    /// monotonic: never use it to measure elapsed time.
    fn wall_clock_millis(&self) -> i64;

    /// Random `u64` for backoff jitter.
    fn random_u64(&self) -> u64 {
        let mut raw = [0u8; 8];
        self.random_bytes(&mut raw);
        u64::from_be_bytes(raw)
    }
}
