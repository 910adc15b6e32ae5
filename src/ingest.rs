//! Applying pushed notifications to the store.
//!
//! One [`EventIngestor`] exists per channel session. It is bound to the store
//! generation that was current when the session opened, so a notification
//! still in flight after teardown can never land in the next session's store.

use crate::effects::SideEffects;
use crate::notification::{IncomingNotification, Notification};
use crate::store::NotificationStore;

/// Result of ingesting one notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ingested {
    /// Stored and side effects fired.
    Stored,
    /// A record with the same id is already held.
    Duplicate,
    /// The session this ingestor belongs to has ended.
    Stale,
    /// Held back because the channel is not authenticated yet.
    Unauthenticated,
}

/// Stores notifications for one session and fires their side effects.
#[derive(Debug, Clone)]
pub struct EventIngestor {
    store: NotificationStore,
    effects: SideEffects,
    generation: u64,
    require_authentication: bool,
}

impl EventIngestor {
    /// Ingestor writing into `store` at `generation`.
    pub fn new(store: NotificationStore, effects: SideEffects, generation: u64) -> Self {
        Self {
            store,
            effects,
            generation,
            require_authentication: false,
        }
    }

    /// Drop notifications that arrive before a successful handshake.
    pub fn require_authentication(mut self, required: bool) -> Self {
        self.require_authentication = required;
        self
    }

    /// Generation this ingestor writes to.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Stamp `incoming` unread, prepend it, then fire side effects.
    ///
    /// Side effects run only after the store accepted the record and their
    /// failures are swallowed.
    pub fn ingest(&self, incoming: IncomingNotification, authenticated: bool) -> Ingested {
        if self.require_authentication && !authenticated {
            log::debug!("Dropping notification {} before authentication", incoming.id);
            return Ingested::Unauthenticated;
        }

        let snapshot = self.store.snapshot();
        if snapshot.generation() != self.generation {
            return Ingested::Stale;
        }
        if snapshot.contains(&incoming.id) {
            log::debug!("Dropping duplicate notification {}", incoming.id);
            return Ingested::Duplicate;
        }

        let notification = Notification::from_incoming(incoming);
        if !self.store.add_in(self.generation, notification.clone()) {
            return Ingested::Stale;
        }

        log::info!(
            "Notification {} ({}): {}",
            notification.id,
            notification.kind,
            notification.title
        );
        self.effects.fire(&notification);
        Ingested::Stored
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::tests::{RecordingNotifier, RecordingSound};
    use crate::effects::PermissionState;
    use chrono::Utc;
    use std::sync::Arc;

    fn incoming(id: &str) -> IncomingNotification {
        IncomingNotification {
            id: id.to_string(),
            kind: "new_review".to_string(),
            title: format!("Review {id}"),
            message: "5 stars".to_string(),
            timestamp: Utc::now(),
            priority: None,
            data: None,
            actions: Vec::new(),
        }
    }

    fn recording() -> (SideEffects, Arc<RecordingNotifier>, Arc<RecordingSound>) {
        let notifier = Arc::new(RecordingNotifier::new(
            PermissionState::Granted,
            PermissionState::Granted,
        ));
        let sound = Arc::new(RecordingSound::default());
        (
            SideEffects::new(notifier.clone(), sound.clone()),
            notifier,
            sound,
        )
    }

    #[test]
    fn test_ingest_stores_unread_and_fires_effects() {
        let store = NotificationStore::new();
        let (effects, notifier, sound) = recording();
        let ingestor = EventIngestor::new(store.clone(), effects, store.generation());

        assert_eq!(ingestor.ingest(incoming("a"), false), Ingested::Stored);

        let snapshot = store.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert!(!snapshot.notifications()[0].read);
        assert_eq!(notifier.shown.lock().unwrap().as_slice(), ["a".to_string()]);
        assert_eq!(sound.volumes.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_duplicate_id_is_dropped_without_effects() {
        let store = NotificationStore::new();
        let (effects, notifier, _sound) = recording();
        let ingestor = EventIngestor::new(store.clone(), effects, store.generation());

        ingestor.ingest(incoming("a"), true);
        store.mark_as_read("a");
        assert_eq!(ingestor.ingest(incoming("a"), true), Ingested::Duplicate);

        assert_eq!(store.snapshot().len(), 1);
        assert_eq!(store.unread_count(), 0);
        assert_eq!(notifier.shown.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_stale_generation_is_rejected() {
        let store = NotificationStore::new();
        let (effects, notifier, _sound) = recording();
        let ingestor = EventIngestor::new(store.clone(), effects, store.generation());

        store.reset();
        assert_eq!(ingestor.ingest(incoming("late"), true), Ingested::Stale);
        assert!(store.snapshot().is_empty());
        assert!(notifier.shown.lock().unwrap().is_empty());
    }

    #[test]
    fn test_authentication_gate() {
        let store = NotificationStore::new();
        let ingestor = EventIngestor::new(store.clone(), SideEffects::noop(), store.generation())
            .require_authentication(true);

        assert_eq!(ingestor.ingest(incoming("a"), false), Ingested::Unauthenticated);
        assert_eq!(ingestor.ingest(incoming("b"), true), Ingested::Stored);
        assert_eq!(store.snapshot().len(), 1);
    }

    #[test]
    fn test_ungated_by_default() {
        let store = NotificationStore::new();
        let ingestor = EventIngestor::new(store.clone(), SideEffects::noop(), store.generation());
        assert_eq!(ingestor.ingest(incoming("a"), false), Ingested::Stored);
    }
}
