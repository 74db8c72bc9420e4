//! Notification feed.
//!
//! Newest first, de-duplicated by notification id. Each genuinely new entry is
//! also published as "latest" for listeners that keep their own lists.

use murmur_proto::Notification;

/// De-duplicated notification list.
#[derive(Debug, Clone, Default)]
pub struct NotificationRelay {
    entries: Vec<Notification>,
    latest: Option<Notification>,
}

impl NotificationRelay {
    /// Create an empty relay.
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle an inbound notification.
    ///
    /// Returns the notification to publish if it was not already present.
    pub fn handle(&mut self, notification: Notification) -> Option<&Notification> {
        if self.contains(notification.id) {
            tracing::debug!(id = notification.id, "duplicate notification");
            return None;
        }

        self.entries.insert(0, notification.clone());
        self.latest = Some(notification);
        self.latest.as_ref()
    }

    /// Whether a notification with this id is present.
    pub fn contains(&self, id: u64) -> bool {
        self.entries.iter().any(|entry| entry.id == id)
    }

    /// All notifications, newest first.
    pub fn entries(&self) -> &[Notification] {
        &self.entries
    }

    /// Most recently published notification.
    pub fn latest(&self) -> Option<&Notification> {
        self.latest.as_ref()
    }

    /// Number of notifications.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if there are no notifications.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
