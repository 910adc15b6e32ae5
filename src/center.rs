//! Consumer-facing surface of the notification subsystem.
//!
//! [`NotificationCenter`] is what a UI holds: read-only views of the feed and
//! connectivity, the store commands and change subscriptions. The transport,
//! handshake and session generations stay behind it.

use std::sync::Arc;

use tokio::sync::watch;

use crate::channel::{Connector, SocketConnector};
use crate::config::Config;
use crate::controller::{ConnectionState, ConnectionWatch, LifecycleController, Transition};
use crate::effects::{PermissionState, SideEffects};
use crate::identity::Identity;
use crate::notification::Notification;
use crate::store::StoreSnapshot;

/// Point-in-time view of everything the UI renders.
#[derive(Debug, Clone)]
pub struct FeedSnapshot {
    /// Most recent first.
    pub notifications: Arc<[Notification]>,
    /// Unread records in `notifications`.
    pub unread_count: usize,
    /// Whether the channel is up.
    pub is_connected: bool,
    /// Detailed connection state.
    pub connection_state: ConnectionState,
}

/// Notification feed bound to the current user.
#[derive(Debug)]
pub struct NotificationCenter<C: Connector = SocketConnector> {
    controller: LifecycleController<C>,
}

impl NotificationCenter<SocketConnector> {
    /// Center using the network transport, configured from `config`.
    ///
    /// Asks for desktop notification permission as [`start`](Self::start)
    /// does.
    pub async fn from_config(config: &Config, effects: SideEffects) -> Self {
        Self::start(LifecycleController::from_config(config, effects)).await
    }
}

impl<C: Connector> NotificationCenter<C> {
    /// Wrap an existing controller without prompting.
    pub fn with_controller(controller: LifecycleController<C>) -> Self {
        Self { controller }
    }

    /// Wrap `controller` and request desktop notification permission if the
    /// user has not decided yet. The prompt runs on the blocking pool.
    pub async fn start(controller: LifecycleController<C>) -> Self {
        controller.effects().prompt_permission().await;
        Self { controller }
    }

    /// Underlying lifecycle controller.
    pub fn controller(&self) -> &LifecycleController<C> {
        &self.controller
    }

    /// Bind the feed to `identity` (`None` = logged out).
    pub async fn set_identity(&self, identity: Option<Identity>) -> Transition {
        self.controller.set_identity(identity).await
    }

    /// Tear everything down, as on logout.
    pub async fn shutdown(&self) {
        self.controller.shutdown().await;
    }

    /// Current notifications, most recent first.
    pub fn notifications(&self) -> Arc<[Notification]> {
        self.controller.store().snapshot().shared()
    }

    /// Number of unread notifications.
    pub fn unread_count(&self) -> usize {
        self.controller.store().unread_count()
    }

    /// Whether the channel is up.
    pub fn is_connected(&self) -> bool {
        self.controller.is_connected()
    }

    /// Detailed connection state.
    pub fn connection_state(&self) -> ConnectionState {
        self.controller.connection_state()
    }

    /// Consistent view of the feed and connectivity.
    pub fn snapshot(&self) -> FeedSnapshot {
        let store = self.controller.store().snapshot();
        let connection_state = self.controller.connection_state();
        FeedSnapshot {
            unread_count: store.unread_count(),
            notifications: store.shared(),
            is_connected: connection_state.is_connected(),
            connection_state,
        }
    }

    /// Mark one notification read. Unknown ids are ignored.
    pub fn mark_as_read(&self, id: &str) {
        self.controller.store().mark_as_read(id);
    }

    /// Mark every notification read.
    pub fn mark_all_as_read(&self) {
        self.controller.store().mark_all_as_read();
    }

    /// Delete one notification. Unknown ids are ignored.
    pub fn remove_notification(&self, id: &str) {
        self.controller.store().remove(id);
    }

    /// Delete every notification.
    pub fn clear_all_notifications(&self) {
        self.controller.store().clear();
    }

    /// Insert a locally produced notification and fire its side effects.
    pub fn push_local(&self, notification: Notification) {
        let store = self.controller.store();
        if store.add_in(store.generation(), notification.clone()) {
            self.controller.effects().fire(&notification);
        }
    }

    /// Desktop notification permission in effect.
    pub fn permission(&self) -> PermissionState {
        self.controller.effects().permission()
    }

    /// Observe feed changes.
    pub fn subscribe(&self) -> watch::Receiver<StoreSnapshot> {
        self.controller.store().subscribe()
    }

    /// Observe connection changes.
    pub fn watch_connection(&self) -> ConnectionWatch {
        self.controller.watch_connection()
    }
}
