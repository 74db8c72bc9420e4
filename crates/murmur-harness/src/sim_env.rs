//! Simulated environment with a virtual clock and seeded RNG.
//!
//! Time only moves when the test calls [`SimEnv::advance`]. The wall clock is
//! derived from the same virtual clock, so optimistic message ids are as
//! reproducible as everything else.

#![allow(clippy::disallowed_types, reason = "Synchronous locking operations only")]

use std::{
    ops::{Add, Sub},
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use murmur_core::env::Environment;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Point on the virtual clock, measured from simulation start.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SimInstant(Duration);

impl SimInstant {
    /// Simulation start.
    pub const START: Self = Self(Duration::ZERO);

    /// Time since simulation start.
    pub fn since_start(self) -> Duration {
        self.0
    }
}

impl Sub for SimInstant {
    type Output = Duration;

    fn sub(self, rhs: Self) -> Duration {
        self.0.saturating_sub(rhs.0)
    }
}

impl Add<Duration> for SimInstant {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self {
        Self(self.0 + rhs)
    }
}

/// Simulated environment shared by the engine and the test.
///
/// Clones share the clock and RNG.
#[derive(Debug, Clone)]
pub struct SimEnv {
    clock: Arc<Mutex<Duration>>,
    rng: Arc<Mutex<ChaCha8Rng>>,
    /// Wall-clock millis at simulation start
    wall_epoch_millis: i64,
}

impl Default for SimEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl SimEnv {
    /// Environment seeded with 0, wall clock starting at 0.
    pub fn new() -> Self {
        Self::with_seed(0)
    }

    /// Environment with the given RNG seed.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            clock: Arc::new(Mutex::new(Duration::ZERO)),
            rng: Arc::new(Mutex::new(ChaCha8Rng::seed_from_u64(seed))),
            wall_epoch_millis: 0,
        }
    }

    /// Start the wall clock at `millis` instead of 0.
    #[must_use]
    pub fn with_wall_epoch(mut self, millis: i64) -> Self {
        self.wall_epoch_millis = millis;
        self
    }

    /// Move the virtual clock forward.
    pub fn advance(&self, duration: Duration) {
        let mut clock = self.clock.lock().unwrap_or_else(PoisonError::into_inner);
        *clock += duration;
    }

    /// Move the virtual clock to `instant`. Earlier instants are ignored.
    pub fn advance_to(&self, instant: SimInstant) {
        let mut clock = self.clock.lock().unwrap_or_else(PoisonError::into_inner);
        *clock = (*clock).max(instant.0);
    }

    /// Time since simulation start.
    pub fn elapsed(&self) -> Duration {
        *self.clock.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Environment for SimEnv {
    type Instant = SimInstant;

    fn now(&self) -> SimInstant {
        SimInstant(self.elapsed())
    }

    /// Sleeping advances the virtual clock and completes immediately.
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        self.advance(duration);
        std::future::ready(())
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        self.rng.lock().unwrap_or_else(PoisonError::into_inner).fill_bytes(buffer);
    }

    fn wall_clock_millis(&self) -> i64 {
        self.wall_epoch_millis + self.elapsed().as_millis() as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_moves_only_on_advance() {
        let env = SimEnv::new();
        let t0 = env.now();
        assert_eq!(env.now(), t0);

        env.advance(Duration::from_millis(1200));
        assert_eq!(env.now() - t0, Duration::from_millis(1200));
        assert_eq!(env.wall_clock_millis(), 1200);
    }

    #[test]
    fn clones_share_the_clock() {
        let env = SimEnv::new().with_wall_epoch(1_000_000);
        let other = env.clone();

        other.advance(Duration::from_secs(1));
        assert_eq!(env.wall_clock_millis(), 1_001_000);
    }

    #[test]
    fn earlier_minus_later_saturates() {
        let early = SimInstant::START;
        let late = early + Duration::from_secs(5);
        assert_eq!(early - late, Duration::ZERO);
    }

    #[test]
    fn same_seed_same_bytes() {
        let a = SimEnv::with_seed(42);
        let b = SimEnv::with_seed(42);
        assert_eq!(a.random_u64(), b.random_u64());
    }

    #[test]
    fn advance_to_never_rewinds() {
        let env = SimEnv::new();
        env.advance(Duration::from_secs(10));
        env.advance_to(SimInstant::START + Duration::from_secs(3));
        assert_eq!(env.elapsed(), Duration::from_secs(10));
    }
}
