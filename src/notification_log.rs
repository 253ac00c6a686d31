use crate::config::RetentionPolicy;
use crate::types::{Address, Notification};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::futures::Notified;
use tokio::sync::Notify;

/// Shared, arrival-ordered log of dimmer level notifications
///
/// The connection's read task appends; any number of pending requests scan
/// concurrently. Every operation takes the one lock for its whole duration.
pub struct NotificationLog {
    entries: Mutex<VecDeque<Notification>>,
    policy: RetentionPolicy,
    appended: Notify,
}

impl NotificationLog {
    /// Create an empty log with the given retention policy
    pub fn new(policy: RetentionPolicy) -> Self {
        let entries = match policy {
            RetentionPolicy::BoundedFifo { capacity } => VecDeque::with_capacity(capacity),
            _ => VecDeque::new(),
        };
        Self {
            entries: Mutex::new(entries),
            policy,
            appended: Notify::new(),
        }
    }

    /// Get the retention policy
    pub fn policy(&self) -> RetentionPolicy {
        self.policy
    }

    /// Append a notification, applying the retention policy, and wake waiters
    pub fn append(&self, notification: Notification) {
        {
            let mut entries = self.lock();
            match self.policy {
                RetentionPolicy::Unbounded => entries.push_back(notification),
                RetentionPolicy::BoundedFifo { capacity } => {
                    entries.push_back(notification);
                    while entries.len() > capacity {
                        entries.pop_front();
                    }
                }
                RetentionPolicy::KeyedLatest => {
                    entries.retain(|existing| existing.address() != notification.address());
                    entries.push_back(notification);
                }
            }
        }
        self.appended.notify_waiters();
    }

    /// The most recently appended entry satisfying `predicate`
    pub fn find_last_matching<F>(&self, predicate: F) -> Option<Notification>
    where
        F: Fn(&Notification) -> bool,
    {
        self.lock().iter().rev().find(|n| predicate(n)).cloned()
    }

    /// Latest entry for `address`, however old
    pub fn latest_for(&self, address: &Address) -> Option<Notification> {
        self.find_last_matching(|n| n.address() == address)
    }

    /// Future resolving on the next append
    ///
    /// Call `enable()` on it before scanning so an append racing the scan is
    /// not missed.
    pub fn appended(&self) -> Notified<'_> {
        self.appended.notified()
    }

    /// Number of notifications held
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the log holds nothing
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Copy of the entries, oldest first
    pub fn snapshot(&self) -> Vec<Notification> {
        self.lock().iter().cloned().collect()
    }

    /// Remove every notification
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Notification>> {
        // Entries are plain values, a panic mid-append cannot leave them torn
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
