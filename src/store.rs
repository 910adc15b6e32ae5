//! Bounded, observable notification store.
//!
//! The store holds at most [`MAX_NOTIFICATIONS`] records, newest first. Every
//! mutation builds a new collection and swaps it in, so a [`StoreSnapshot`]
//! handed to a reader never changes underneath it.
//!
//! # Generations
//!
//! Each store lifetime (one bound identity) has a generation number.
//! [`NotificationStore::reset`] empties the store and bumps the generation.
//! Writers tied to a session use [`NotificationStore::add_in`], which refuses
//! the write once the session's generation is stale. This is what keeps
//! in-flight events from a torn-down channel out of the next user's view.
//!
//! # Observation
//!
//! [`NotificationStore::subscribe`] returns a `watch::Receiver` that wakes on
//! every effective change. Commands that change nothing (marking an already
//! read or missing id) do not wake subscribers.

use std::sync::Arc;

use tokio::sync::watch;

use crate::constants::MAX_NOTIFICATIONS;
use crate::notification::Notification;

/// An immutable view of the store.
#[derive(Debug, Clone)]
pub struct StoreSnapshot {
    generation: u64,
    notifications: Arc<[Notification]>,
}

impl Default for StoreSnapshot {
    fn default() -> Self {
        Self {
            generation: 0,
            notifications: Arc::from(Vec::new()),
        }
    }
}

impl StoreSnapshot {
    /// Notifications, most recent first.
    pub fn notifications(&self) -> &[Notification] {
        &self.notifications
    }

    /// Shared handle to the notification slice.
    pub fn shared(&self) -> Arc<[Notification]> {
        Arc::clone(&self.notifications)
    }

    /// Number of unread records, derived on every call.
    pub fn unread_count(&self) -> usize {
        self.notifications.iter().filter(|n| !n.read).count()
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.notifications.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.notifications.is_empty()
    }

    /// Store generation this snapshot belongs to.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Look up a record by id.
    pub fn get(&self, id: &str) -> Option<&Notification> {
        self.notifications.iter().find(|n| n.id == id)
    }

    /// Whether a record with `id` is present.
    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }
}

/// Cloneable handle to the shared store.
///
/// All clones observe and mutate the same collection.
#[derive(Debug, Clone)]
pub struct NotificationStore {
    tx: Arc<watch::Sender<StoreSnapshot>>,
    capacity: usize,
}

impl Default for NotificationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationStore {
    /// Create an empty store with the standard retention limit.
    pub fn new() -> Self {
        Self::with_capacity(MAX_NOTIFICATIONS)
    }

    /// Create an empty store with a custom retention limit (minimum 1).
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _rx) = watch::channel(StoreSnapshot::default());
        Self {
            tx: Arc::new(tx),
            capacity: capacity.max(1),
        }
    }

    /// Retention limit.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> StoreSnapshot {
        self.tx.borrow().clone()
    }

    /// Subscribe to changes.
    pub fn subscribe(&self) -> watch::Receiver<StoreSnapshot> {
        self.tx.subscribe()
    }

    /// Current generation.
    pub fn generation(&self) -> u64 {
        self.tx.borrow().generation
    }

    /// Derived unread count.
    pub fn unread_count(&self) -> usize {
        self.tx.borrow().unread_count()
    }

    /// Prepend `notification` as unread, evicting the oldest past capacity.
    pub fn add(&self, notification: Notification) {
        let capacity = self.capacity;
        self.tx.send_modify(|snap| {
            snap.notifications = prepend(&snap.notifications, notification, capacity);
        });
    }

    /// Like [`add`](Self::add), but only if the store is still at
    /// `generation`. Returns whether the record was stored.
    pub fn add_in(&self, generation: u64, notification: Notification) -> bool {
        let capacity = self.capacity;
        self.tx.send_if_modified(|snap| {
            if snap.generation != generation {
                return false;
            }
            snap.notifications = prepend(&snap.notifications, notification, capacity);
            true
        })
    }

    /// Mark one record read. Missing ids are a no-op.
    pub fn mark_as_read(&self, id: &str) {
        self.tx.send_if_modified(|snap| {
            if !snap.notifications.iter().any(|n| n.id == id && !n.read) {
                return false;
            }
            snap.notifications = snap
                .notifications
                .iter()
                .map(|n| {
                    if n.id == id {
                        Notification {
                            read: true,
                            ..n.clone()
                        }
                    } else {
                        n.clone()
                    }
                })
                .collect();
            true
        });
    }

    /// Mark every record read.
    pub fn mark_all_as_read(&self) {
        self.tx.send_if_modified(|snap| {
            if snap.notifications.iter().all(|n| n.read) {
                return false;
            }
            snap.notifications = snap
                .notifications
                .iter()
                .map(|n| Notification {
                    read: true,
                    ..n.clone()
                })
                .collect();
            true
        });
    }

    /// Delete one record. Missing ids are a no-op.
    pub fn remove(&self, id: &str) {
        self.tx.send_if_modified(|snap| {
            if !snap.notifications.iter().any(|n| n.id == id) {
                return false;
            }
            snap.notifications = snap
                .notifications
                .iter()
                .filter(|n| n.id != id)
                .cloned()
                .collect();
            true
        });
    }

    /// Empty the collection, keeping the current generation.
    pub fn clear(&self) {
        self.tx.send_if_modified(|snap| {
            if snap.notifications.is_empty() {
                return false;
            }
            snap.notifications = Arc::from(Vec::new());
            true
        });
    }

    /// Empty the collection and start a new generation.
    ///
    /// Returns the new generation.
    pub fn reset(&self) -> u64 {
        let mut generation = 0;
        self.tx.send_modify(|snap| {
            snap.generation = snap.generation.wrapping_add(1);
            snap.notifications = Arc::from(Vec::new());
            generation = snap.generation;
        });
        generation
    }
}

fn prepend(
    current: &[Notification],
    mut notification: Notification,
    capacity: usize,
) -> Arc<[Notification]> {
    notification.read = false;
    std::iter::once(notification)
        .chain(current.iter().take(capacity - 1).cloned())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(id: &str) -> Notification {
        Notification {
            id: id.to_string(),
            ..Notification::local("review", "New review", "body")
        }
    }

    fn ids(store: &NotificationStore) -> Vec<String> {
        store
            .snapshot()
            .notifications()
            .iter()
            .map(|n| n.id.clone())
            .collect()
    }

    #[test]
    fn test_add_prepends_unread() {
        let store = NotificationStore::new();
        let mut first = note("a");
        first.read = true;
        store.add(first);
        store.add(note("b"));

        assert_eq!(ids(&store), vec!["b", "a"]);
        assert!(store.snapshot().notifications().iter().all(|n| !n.read));
        assert_eq!(store.unread_count(), 2);
    }

    #[test]
    fn test_fifty_two_adds_keep_newest_fifty() {
        let store = NotificationStore::new();
        for i in 1..=52 {
            store.add(note(&i.to_string()));
        }

        let expected: Vec<String> = (3..=52).rev().map(|i| i.to_string()).collect();
        assert_eq!(ids(&store), expected);
        assert_eq!(store.unread_count(), 50);
    }

    #[test]
    fn test_cap_holds_for_every_prefix() {
        let store = NotificationStore::with_capacity(5);
        for i in 0..20 {
            store.add(note(&i.to_string()));
            let snap = store.snapshot();
            assert!(snap.len() <= 5);
            assert_eq!(snap.notifications()[0].id, i.to_string());
        }
    }

    #[test]
    fn test_mark_as_read_twice_is_harmless() {
        let store = NotificationStore::new();
        store.add(note("a"));
        store.mark_as_read("a");
        store.mark_as_read("a");

        let snap = store.snapshot();
        assert_eq!(snap.len(), 1);
        assert!(snap.get("a").unwrap().read);
        assert_eq!(snap.unread_count(), 0);
    }

    #[test]
    fn test_missing_ids_leave_collection_unchanged() {
        let store = NotificationStore::new();
        store.add(note("a"));
        store.add(note("b"));
        let before = store.snapshot();

        store.mark_as_read("zzz");
        store.remove("zzz");

        let after = store.snapshot();
        assert_eq!(before.notifications(), after.notifications());
        // No-op commands do not replace the collection at all.
        assert!(Arc::ptr_eq(&before.shared(), &after.shared()));
    }

    #[test]
    fn test_commands_after_clear_are_noops() {
        let store = NotificationStore::new();
        store.add(note("a"));
        store.clear();

        store.mark_as_read("a");
        store.remove("a");
        store.mark_all_as_read();
        store.clear();

        assert!(store.snapshot().is_empty());
        assert_eq!(store.unread_count(), 0);
    }

    #[test]
    fn test_unread_count_tracks_interleaving() {
        let store = NotificationStore::new();
        for id in ["a", "b", "c", "d"] {
            store.add(note(id));
        }
        store.mark_as_read("b");
        assert_eq!(store.unread_count(), 3);
        store.remove("a");
        assert_eq!(store.unread_count(), 2);
        store.remove("b");
        assert_eq!(store.unread_count(), 2);
        store.add(note("e"));
        assert_eq!(store.unread_count(), 3);
        store.mark_all_as_read();
        assert_eq!(store.unread_count(), 0);
        store.add(note("f"));

        let snap = store.snapshot();
        assert_eq!(
            snap.unread_count(),
            snap.notifications().iter().filter(|n| !n.read).count()
        );
        assert_eq!(snap.unread_count(), 1);
    }

    #[test]
    fn test_snapshots_are_not_mutated_in_place() {
        let store = NotificationStore::new();
        store.add(note("a"));
        let before = store.snapshot();
        store.mark_as_read("a");
        assert!(!before.get("a").unwrap().read);
        assert!(store.snapshot().get("a").unwrap().read);
    }

    #[test]
    fn test_reset_bumps_generation_and_rejects_stale_writes() {
        let store = NotificationStore::new();
        let old = store.reset();
        assert!(store.add_in(old, note("a")));

        let new = store.reset();
        assert_ne!(old, new);
        assert!(store.snapshot().is_empty());

        assert!(!store.add_in(old, note("late")));
        assert!(store.snapshot().is_empty());
        assert!(store.add_in(new, note("b")));
        assert_eq!(ids(&store), vec!["b"]);
    }

    #[tokio::test]
    async fn test_subscribers_wake_on_effective_changes_only() {
        let store = NotificationStore::new();
        let mut rx = store.subscribe();

        store.add(note("a"));
        assert!(rx.has_changed().unwrap());
        rx.borrow_and_update();

        store.mark_as_read("missing");
        assert!(!rx.has_changed().unwrap());

        store.mark_as_read("a");
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().unread_count(), 0);
    }
}
