//! Presence synchronization.
//!
//! Owns the presence map, the retained watch-set, and the local idle detector.
//! Methods return the frames to send on the global channel; the engine routes
//! them through the channel registry, which drops them while disconnected.
//!
//! # Invariants
//!
//! - Records are never removed during a session. An unknown user reads as
//!   [`PresenceStatus::Offline`].
//! - The watch-set only grows; the full set is the durable subscription
//!   replayed on every reconnect.

use std::{
    collections::{BTreeSet, HashMap},
    ops::Sub,
    time::Duration,
};

use murmur_proto::{OutboundFrame, PresenceRecord, PresenceStatus, UserId};

use crate::idle::{ActivityState, DEFAULT_IDLE_THRESHOLD, IdleDetector};

/// Presence configuration
#[derive(Debug, Clone, Copy)]
pub struct PresenceConfig {
    /// Inactivity before the user is marked idle
    pub idle_threshold: Duration,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self { idle_threshold: DEFAULT_IDLE_THRESHOLD }
    }
}

/// Presence state for the current session.
#[derive(Debug, Clone)]
pub struct PresenceSync<I>
where
    I: Copy + Ord + Sub<Output = Duration>,
{
    self_id: UserId,
    records: HashMap<UserId, PresenceRecord>,
    watched: BTreeSet<UserId>,
    idle: IdleDetector<I>,
}

impl<I> PresenceSync<I>
where
    I: Copy + Ord + Sub<Output = Duration>,
{
    /// Create presence state for `self_id`. The idle countdown starts at
    /// `now`.
    pub fn new(self_id: UserId, config: PresenceConfig, now: I) -> Self {
        Self {
            self_id,
            records: HashMap::new(),
            watched: BTreeSet::new(),
            idle: IdleDetector::new(now, config.idle_threshold),
        }
    }

    /// Add users to the watch-set.
    ///
    /// Returns a subscribe frame for the newly added ids, or `None` if all
    /// were already watched.
    pub fn subscribe(&mut self, user_ids: impl IntoIterator<Item = UserId>) -> Option<OutboundFrame> {
        let added: Vec<UserId> = user_ids.into_iter().filter(|id| self.watched.insert(*id)).collect();
        if added.is_empty() {
            return None;
        }
        Some(OutboundFrame::SubscribePresence { user_ids: added })
    }

    /// Subscribe frame for the entire watch-set, replayed on reconnect.
    pub fn subscription(&self) -> Option<OutboundFrame> {
        if self.watched.is_empty() {
            return None;
        }
        Some(OutboundFrame::SubscribePresence { user_ids: self.watched.iter().copied().collect() })
    }

    /// Watched users in id order.
    pub fn watched(&self) -> impl Iterator<Item = UserId> + '_ {
        self.watched.iter().copied()
    }

    /// Replace one user's record wholesale. Returns the user id.
    pub fn handle_update(&mut self, record: PresenceRecord) -> UserId {
        let user_id = record.user_id;
        self.records.insert(user_id, record);
        user_id
    }

    /// Merge a batch, overwriting per key. Returns affected ids in order.
    ///
    /// The map key is authoritative; a record whose embedded `user_id`
    /// disagrees is stored under the key with the id corrected.
    pub fn handle_state_sync(
        &mut self,
        records: impl IntoIterator<Item = (UserId, PresenceRecord)>,
    ) -> Vec<UserId> {
        let mut changed: Vec<UserId> = records
            .into_iter()
            .map(|(user_id, mut record)| {
                record.user_id = user_id;
                self.records.insert(user_id, record);
                user_id
            })
            .collect();
        changed.sort_unstable();
        changed
    }

    /// Frame changing the local user's status.
    pub fn change_status(&self, status: PresenceStatus) -> OutboundFrame {
        OutboundFrame::ChangeStatus { status }
    }

    /// Change the local user's custom status.
    ///
    /// Optimistically rewrites the local user's own record right away,
    /// keeping its status (online if there was no record) and stamping
    /// `wall_clock_millis`. Returns the frame to send.
    pub fn change_custom_status(
        &mut self,
        text: Option<String>,
        emoji: Option<String>,
        wall_clock_millis: i64,
    ) -> OutboundFrame {
        let status = self.records.get(&self.self_id).map_or(PresenceStatus::Online, |r| r.status);

        self.records.insert(self.self_id, PresenceRecord {
            user_id: self.self_id,
            status,
            last_heartbeat: wall_clock_millis,
            status_message: text.clone(),
            status_emoji: emoji.clone(),
        });

        OutboundFrame::ChangeStatusMessage { text, emoji }
    }

    /// Record user activity. Returns `change_status(online)` when waking from
    /// idle.
    pub fn activity(&mut self, now: I) -> Option<OutboundFrame> {
        self.idle.record_activity(now).map(|status| self.change_status(status))
    }

    /// Check the idle countdown. Returns `change_status(idle)` when it fires.
    pub fn tick(&mut self, now: I) -> Option<OutboundFrame> {
        self.idle.tick(now).map(|status| self.change_status(status))
    }

    /// Local activity state.
    pub fn activity_state(&self) -> ActivityState {
        self.idle.state()
    }

    /// Idle detector, for inspection.
    pub fn idle(&self) -> &IdleDetector<I> {
        &self.idle
    }

    /// Status of `user_id`; unknown users are offline.
    pub fn status_of(&self, user_id: UserId) -> PresenceStatus {
        self.records.get(&user_id).map_or(PresenceStatus::Offline, |record| record.status)
    }

    /// Record for `user_id`.
    pub fn record(&self, user_id: UserId) -> Option<&PresenceRecord> {
        self.records.get(&user_id)
    }

    /// All known records.
    pub fn records(&self) -> impl Iterator<Item = &PresenceRecord> {
        self.records.values()
    }

    /// Local user's id.
    pub fn self_id(&self) -> UserId {
        self.self_id
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;

    fn record(user_id: UserId, status: PresenceStatus) -> PresenceRecord {
        PresenceRecord {
            user_id,
            status,
            last_heartbeat: 0,
            status_message: None,
            status_emoji: None,
        }
    }

    fn presence() -> PresenceSync<Instant> {
        PresenceSync::new(1, PresenceConfig::default(), Instant::now())
    }

    #[test]
    fn subscribe_sends_only_new_ids() {
        let mut presence = presence();

        assert_eq!(
            presence.subscribe([3, 2]),
            Some(OutboundFrame::SubscribePresence { user_ids: vec![3, 2] })
        );
        assert_eq!(
            presence.subscribe([2, 4]),
            Some(OutboundFrame::SubscribePresence { user_ids: vec![4] })
        );
        assert_eq!(presence.subscribe([4]), None);

        assert_eq!(
            presence.subscription(),
            Some(OutboundFrame::SubscribePresence { user_ids: vec![2, 3, 4] })
        );
    }

    #[test]
    fn empty_watch_set_has_no_subscription() {
        assert_eq!(presence().subscription(), None);
    }

    #[test]
    fn update_replaces_record_wholesale() {
        let mut presence = presence();
        let mut first = record(5, PresenceStatus::Dnd);
        first.status_message = Some("busy".to_string());
        presence.handle_update(first);

        presence.handle_update(record(5, PresenceStatus::Online));

        let stored = presence.record(5).unwrap();
        assert_eq!(stored.status, PresenceStatus::Online);
        assert_eq!(stored.status_message, None);
    }

    #[test]
    fn state_sync_merges_per_key() {
        let mut presence = presence();
        presence.handle_update(record(5, PresenceStatus::Online));
        presence.handle_update(record(6, PresenceStatus::Online));

        let changed = presence.handle_state_sync([
            (6, record(6, PresenceStatus::Idle)),
            (7, record(7, PresenceStatus::Dnd)),
        ]);

        assert_eq!(changed, vec![6, 7]);
        assert_eq!(presence.status_of(5), PresenceStatus::Online);
        assert_eq!(presence.status_of(6), PresenceStatus::Idle);
        assert_eq!(presence.status_of(7), PresenceStatus::Dnd);
    }

    #[test]
    fn unknown_user_is_offline() {
        assert_eq!(presence().status_of(99), PresenceStatus::Offline);
    }

    #[test]
    fn custom_status_keeps_existing_status() {
        let mut presence = presence();
        presence.handle_update(record(1, PresenceStatus::Dnd));

        let frame = presence.change_custom_status(Some("lunch".to_string()), Some("🍜".to_string()), 42);

        assert_eq!(frame, OutboundFrame::ChangeStatusMessage {
            text: Some("lunch".to_string()),
            emoji: Some("🍜".to_string()),
        });
        let own = presence.record(1).unwrap();
        assert_eq!(own.status, PresenceStatus::Dnd);
        assert_eq!(own.last_heartbeat, 42);
        assert_eq!(own.status_message.as_deref(), Some("lunch"));
    }

    #[test]
    fn custom_status_without_record_defaults_online() {
        let mut presence = presence();
        presence.change_custom_status(None, Some("🌴".to_string()), 7);
        assert_eq!(presence.status_of(1), PresenceStatus::Online);
    }

    #[test]
    fn idle_transitions_produce_status_frames() {
        let t0 = Instant::now();
        let mut presence = PresenceSync::new(1, PresenceConfig::default(), t0);

        assert_eq!(presence.tick(t0 + Duration::from_secs(299)), None);
        assert_eq!(
            presence.tick(t0 + Duration::from_secs(300)),
            Some(OutboundFrame::ChangeStatus { status: PresenceStatus::Idle })
        );
        assert_eq!(presence.activity_state(), ActivityState::Idle);

        assert_eq!(
            presence.activity(t0 + Duration::from_secs(301)),
            Some(OutboundFrame::ChangeStatus { status: PresenceStatus::Online })
        );
        assert_eq!(presence.activity(t0 + Duration::from_secs(302)), None);
    }
}
