//! Typing indicators.
//!
//! [`TypingIndicatorSet`] tracks other users typing in the active room.
//! Entries leave on an explicit stop event, or once they go unrefreshed for
//! the remote TTL (a peer that vanished without sending stop).
//!
//! [`OutgoingTyping`] is the local user's own indicator: `typing` is sent once
//! per burst and `stop_typing` after the timeout or on send.

use std::{collections::BTreeMap, ops::Sub, time::Duration};

use murmur_proto::{OutboundFrame, UserId};

#[derive(Debug, Clone)]
struct TypingEntry<I> {
    nickname: String,
    refreshed_at: I,
}

/// Other users currently typing, keyed by user id.
#[derive(Debug, Clone)]
pub struct TypingIndicatorSet<I>
where
    I: Copy + Ord + Sub<Output = Duration>,
{
    entries: BTreeMap<UserId, TypingEntry<I>>,
}

impl<I> Default for TypingIndicatorSet<I>
where
    I: Copy + Ord + Sub<Output = Duration>,
{
    fn default() -> Self {
        Self { entries: BTreeMap::new() }
    }
}

impl<I> TypingIndicatorSet<I>
where
    I: Copy + Ord + Sub<Output = Duration>,
{
    /// Add or refresh a typist. Returns true if the visible set changed.
    pub fn insert(&mut self, user_id: UserId, nickname: String, now: I) -> bool {
        match self.entries.get_mut(&user_id) {
            Some(entry) => {
                entry.refreshed_at = now;
                if entry.nickname == nickname {
                    false
                } else {
                    entry.nickname = nickname;
                    true
                }
            },
            None => {
                self.entries.insert(user_id, TypingEntry { nickname, refreshed_at: now });
                true
            },
        }
    }

    /// Remove a typist. Returns true if they were present.
    pub fn remove(&mut self, user_id: UserId) -> bool {
        self.entries.remove(&user_id).is_some()
    }

    /// Drop entries not refreshed within `ttl`. Returns true if any left.
    pub fn expire(&mut self, now: I, ttl: Duration) -> bool {
        let before = self.entries.len();
        self.entries.retain(|_, entry| now - entry.refreshed_at < ttl);
        self.entries.len() != before
    }

    /// Whether `user_id` is typing.
    pub fn contains(&self, user_id: UserId) -> bool {
        self.entries.contains_key(&user_id)
    }

    /// Typists in user id order.
    pub fn iter(&self) -> impl Iterator<Item = (UserId, &str)> {
        self.entries.iter().map(|(id, entry)| (*id, entry.nickname.as_str()))
    }

    /// Display names in user id order.
    pub fn nicknames(&self) -> Vec<String> {
        self.entries.values().map(|entry| entry.nickname.clone()).collect()
    }

    /// Number of typists.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nobody is typing.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Forget everyone.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// The local user's outgoing typing indicator.
#[derive(Debug, Clone)]
pub struct OutgoingTyping<I>
where
    I: Copy + Ord + Sub<Output = Duration>,
{
    /// Last input while flagged; `None` when not typing
    last_input: Option<I>,
}

impl<I> Default for OutgoingTyping<I>
where
    I: Copy + Ord + Sub<Output = Duration>,
{
    fn default() -> Self {
        Self { last_input: None }
    }
}

impl<I> OutgoingTyping<I>
where
    I: Copy + Ord + Sub<Output = Duration>,
{
    /// Whether the local user is flagged as typing.
    pub fn is_typing(&self) -> bool {
        self.last_input.is_some()
    }

    /// Composer text changed.
    ///
    /// Returns `Typing` when a burst starts. While flagged, every change
    /// re-arms the timeout.
    pub fn input_changed(&mut self, text: &str, now: I) -> Option<OutboundFrame> {
        if self.last_input.is_some() {
            self.last_input = Some(now);
            return None;
        }

        if text.trim().is_empty() {
            return None;
        }

        self.last_input = Some(now);
        Some(OutboundFrame::Typing)
    }

    /// Returns `StopTyping` once `timeout` passes without input.
    pub fn tick(&mut self, now: I, timeout: Duration) -> Option<OutboundFrame> {
        let last = self.last_input?;
        if now - last < timeout {
            return None;
        }
        self.last_input = None;
        Some(OutboundFrame::StopTyping)
    }

    /// Stop immediately. Returns `StopTyping` if flagged.
    pub fn stop(&mut self) -> Option<OutboundFrame> {
        self.last_input.take().map(|_| OutboundFrame::StopTyping)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[test]
    fn typing_sent_once_per_burst() {
        let t0 = Instant::now();
        let mut typing = OutgoingTyping::default();

        assert_eq!(typing.input_changed("h", t0), Some(OutboundFrame::Typing));
        assert_eq!(typing.input_changed("he", t0 + Duration::from_secs(1)), None);
        assert_eq!(typing.input_changed("hel", t0 + Duration::from_secs(2)), None);
        assert!(typing.is_typing());
    }

    #[test]
    fn blank_input_does_not_start_burst() {
        let mut typing = OutgoingTyping::default();
        assert_eq!(typing.input_changed("   ", Instant::now()), None);
        assert!(!typing.is_typing());
    }

    #[test]
    fn each_change_rearms_timeout() {
        let t0 = Instant::now();
        let mut typing = OutgoingTyping::default();
        typing.input_changed("h", t0);
        typing.input_changed("hi", t0 + Duration::from_secs(4));

        assert_eq!(typing.tick(t0 + Duration::from_secs(8), TIMEOUT), None);
        assert_eq!(typing.tick(t0 + Duration::from_secs(9), TIMEOUT), Some(OutboundFrame::StopTyping));
        assert!(!typing.is_typing());
        assert_eq!(typing.tick(t0 + Duration::from_secs(20), TIMEOUT), None);
    }

    #[test]
    fn stop_only_when_flagged() {
        let mut typing = OutgoingTyping::default();
        assert_eq!(typing.stop(), None);

        typing.input_changed("x", Instant::now());
        assert_eq!(typing.stop(), Some(OutboundFrame::StopTyping));
        assert_eq!(typing.stop(), None);
    }

    #[test]
    fn remote_set_insert_and_remove() {
        let t0 = Instant::now();
        let mut set = TypingIndicatorSet::default();

        assert!(set.insert(2, "bo".to_string(), t0));
        assert!(!set.insert(2, "bo".to_string(), t0 + Duration::from_secs(1)));
        assert!(set.insert(3, "cy".to_string(), t0));
        assert_eq!(set.nicknames(), vec!["bo".to_string(), "cy".to_string()]);

        assert!(set.remove(2));
        assert!(!set.remove(2));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn remote_entries_expire_without_refresh() {
        let t0 = Instant::now();
        let ttl = Duration::from_secs(60);
        let mut set = TypingIndicatorSet::default();
        set.insert(2, "bo".to_string(), t0);
        set.insert(3, "cy".to_string(), t0);
        set.insert(3, "cy".to_string(), t0 + Duration::from_secs(30));

        assert!(!set.expire(t0 + Duration::from_secs(59), ttl));
        assert!(set.expire(t0 + Duration::from_secs(60), ttl));
        assert!(!set.contains(2));
        assert!(set.contains(3));
    }
}
