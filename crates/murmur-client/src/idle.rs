//! Local idle detection.
//!
//! One countdown, armed at construction and re-armed by every activity event.
//! The user turns idle only after a full uninterrupted threshold of
//! inactivity; any activity while idle restores online immediately.

use std::{ops::Sub, time::Duration};

use murmur_proto::PresenceStatus;

/// Inactivity before the user is marked idle.
pub const DEFAULT_IDLE_THRESHOLD: Duration = Duration::from_secs(5 * 60);

/// Activity state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityState {
    /// Recent activity
    Active,
    /// No activity for the full threshold
    Idle,
}

/// Idle detection state machine.
#[derive(Debug, Clone)]
pub struct IdleDetector<I>
where
    I: Copy + Ord + Sub<Output = Duration>,
{
    state: ActivityState,
    threshold: Duration,
    armed_at: I,
}

impl<I> IdleDetector<I>
where
    I: Copy + Ord + Sub<Output = Duration>,
{
    /// Start Active with the countdown armed at `now`.
    pub fn new(now: I, threshold: Duration) -> Self {
        Self { state: ActivityState::Active, threshold, armed_at: now }
    }

    /// Current state.
    pub fn state(&self) -> ActivityState {
        self.state
    }

    /// When the countdown was last armed.
    pub fn armed_at(&self) -> I {
        self.armed_at
    }

    /// Record an activity event.
    ///
    /// Re-arms the countdown. Returns `Some(Online)` when leaving Idle.
    pub fn record_activity(&mut self, now: I) -> Option<PresenceStatus> {
        self.armed_at = now;

        match self.state {
            ActivityState::Active => None,
            ActivityState::Idle => {
                self.state = ActivityState::Active;
                Some(PresenceStatus::Online)
            },
        }
    }

    /// Check the countdown. Returns `Some(Idle)` on the Active→Idle edge.
    pub fn tick(&mut self, now: I) -> Option<PresenceStatus> {
        if self.state == ActivityState::Active && now - self.armed_at >= self.threshold {
            self.state = ActivityState::Idle;
            return Some(PresenceStatus::Idle);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;

    #[test]
    fn idle_after_full_threshold() {
        let t0 = Instant::now();
        let mut idle = IdleDetector::new(t0, DEFAULT_IDLE_THRESHOLD);

        assert_eq!(idle.tick(t0 + Duration::from_millis(299_999)), None);
        assert_eq!(idle.tick(t0 + Duration::from_millis(300_000)), Some(PresenceStatus::Idle));
        assert_eq!(idle.state(), ActivityState::Idle);

        // Fires once
        assert_eq!(idle.tick(t0 + Duration::from_secs(900)), None);
    }

    #[test]
    fn activity_resets_countdown() {
        let t0 = Instant::now();
        let mut idle = IdleDetector::new(t0, DEFAULT_IDLE_THRESHOLD);

        assert_eq!(idle.record_activity(t0 + Duration::from_secs(200)), None);
        assert_eq!(idle.tick(t0 + Duration::from_secs(300)), None);
        assert_eq!(idle.tick(t0 + Duration::from_secs(499)), None);
        assert_eq!(idle.tick(t0 + Duration::from_secs(500)), Some(PresenceStatus::Idle));
    }

    #[test]
    fn activity_while_idle_restores_online() {
        let t0 = Instant::now();
        let mut idle = IdleDetector::new(t0, DEFAULT_IDLE_THRESHOLD);
        idle.tick(t0 + Duration::from_millis(300_000));

        let wake = t0 + Duration::from_millis(300_001);
        assert_eq!(idle.record_activity(wake), Some(PresenceStatus::Online));
        assert_eq!(idle.state(), ActivityState::Active);
        assert_eq!(idle.armed_at(), wake);

        assert_eq!(idle.tick(wake + Duration::from_millis(299_999)), None);
        assert_eq!(idle.tick(wake + DEFAULT_IDLE_THRESHOLD), Some(PresenceStatus::Idle));
    }
}
