//! Lifecycle controller: binds the channel to the current identity.
//!
//! The controller owns the transport, the per-session event pump and the
//! connection state. The host feeds it identity changes through
//! [`LifecycleController::set_identity`]; everything else follows from the
//! pair (previous, next):
//!
//! | previous | next   | action                                   |
//! |----------|--------|------------------------------------------|
//! | none     | some   | open channel, handshake on every connect |
//! | some A   | some A | nothing                                  |
//! | some A   | some B | tear down A, open B                      |
//! | any      | none   | tear down, store emptied                 |
//!
//! # Generations
//!
//! Every session runs under a store generation. Teardown cancels the pump
//! and resets the store, which bumps the generation; store and state writes
//! tagged with an older generation are discarded. An event that was already
//! in flight when the session ended therefore has no effect.

// Rust guideline compliant 2026-02

use std::sync::Arc;

use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::channel::{
    Connector, EmitHandle, Endpoint, SocketConnector, Transport, TransportEvent,
};
use crate::config::Config;
use crate::effects::SideEffects;
use crate::identity::Identity;
use crate::ingest::EventIngestor;
use crate::protocol::{ClientEvent, ServerEvent};
use crate::store::NotificationStore;

/// Connection state as seen by the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No channel, or the channel dropped.
    #[default]
    Disconnected,
    /// Channel opening or reconnecting.
    Connecting,
    /// Channel up, handshake not (yet) acknowledged.
    ConnectedUnauthenticated,
    /// Channel up and handshake acknowledged.
    Authenticated,
}

impl ConnectionState {
    /// Whether the underlying channel is up, authenticated or not.
    pub fn is_connected(self) -> bool {
        matches!(self, Self::ConnectedUnauthenticated | Self::Authenticated)
    }

    /// Display name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::ConnectedUnauthenticated => "connected",
            Self::Authenticated => "authenticated",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What an identity change requires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Same identity; keep the current channel.
    Unchanged,
    /// No channel yet; open one for this identity.
    Open(Identity),
    /// Identity lost; tear everything down.
    Close,
    /// Different identity; tear down, then open for the new one.
    Switch(Identity),
}

impl Transition {
    /// Pure decision from the previous and next identity.
    ///
    /// Identities compare on every field, so a changed business list is a
    /// switch. A `None` next identity always closes, even when nothing is
    /// open, so logout leaves an empty store.
    pub fn between(previous: Option<&Identity>, next: Option<&Identity>) -> Self {
        match (previous, next) {
            (_, None) => Self::Close,
            (None, Some(next)) => Self::Open(next.clone()),
            (Some(prev), Some(next)) if prev == next => Self::Unchanged,
            (Some(_), Some(next)) => Self::Switch(next.clone()),
        }
    }
}

/// Connection state tagged with the session generation that wrote it.
#[derive(Debug, Clone, Copy, Default)]
struct Tracked {
    generation: u64,
    state: ConnectionState,
}

/// Write `state` if `generation` is still the current session.
fn publish(connection: &watch::Sender<Tracked>, generation: u64, state: ConnectionState) -> bool {
    connection.send_if_modified(|tracked| {
        if tracked.generation != generation || tracked.state == state {
            return false;
        }
        tracked.state = state;
        true
    })
}

/// Observer of connection state changes.
#[derive(Debug, Clone)]
pub struct ConnectionWatch {
    rx: watch::Receiver<Tracked>,
}

impl ConnectionWatch {
    /// Wait for the next change. `None` once the controller is gone.
    pub async fn changed(&mut self) -> Option<ConnectionState> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().state)
    }

    /// Wait until the state satisfies `predicate`.
    pub async fn wait_for(
        &mut self,
        mut predicate: impl FnMut(ConnectionState) -> bool,
    ) -> Option<ConnectionState> {
        self.rx
            .wait_for(|tracked| predicate(tracked.state))
            .await
            .ok()
            .map(|tracked| tracked.state)
    }
}

/// One open channel bound to one identity.
#[derive(Debug)]
struct Session {
    identity: Identity,
    generation: u64,
    transport: Box<dyn Transport>,
    cancel: CancellationToken,
    pump: Option<JoinHandle<()>>,
}

/// Owns the channel lifecycle for a changing identity.
pub struct LifecycleController<C: Connector = SocketConnector> {
    connector: C,
    endpoint: Endpoint,
    store: NotificationStore,
    effects: SideEffects,
    require_authentication: bool,
    connection: Arc<watch::Sender<Tracked>>,
    session: Mutex<Option<Session>>,
}

impl<C: Connector> std::fmt::Debug for LifecycleController<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleController")
            .field("endpoint", &self.endpoint)
            .field("state", &self.connection_state())
            .field("require_authentication", &self.require_authentication)
            .finish_non_exhaustive()
    }
}

impl LifecycleController<SocketConnector> {
    /// Controller using the network transport.
    pub fn new(endpoint: Endpoint, effects: SideEffects) -> Self {
        Self::with_connector(SocketConnector::default(), endpoint, effects)
    }

    /// Controller configured from `config`.
    pub fn from_config(config: &Config, effects: SideEffects) -> Self {
        Self::new(Endpoint::from(config), effects)
            .require_authentication(config.require_authentication)
    }
}

impl<C: Connector> LifecycleController<C> {
    /// Controller using a custom connector.
    pub fn with_connector(connector: C, endpoint: Endpoint, effects: SideEffects) -> Self {
        let (connection, _rx) = watch::channel(Tracked::default());
        Self {
            connector,
            endpoint,
            store: NotificationStore::new(),
            effects,
            require_authentication: false,
            connection: Arc::new(connection),
            session: Mutex::new(None),
        }
    }

    /// Drop notifications that arrive before a successful handshake.
    #[must_use]
    pub fn require_authentication(mut self, required: bool) -> Self {
        self.require_authentication = required;
        self
    }

    /// The store this controller feeds.
    pub fn store(&self) -> &NotificationStore {
        &self.store
    }

    /// The side effects fired on ingestion.
    pub fn effects(&self) -> &SideEffects {
        &self.effects
    }

    /// Server endpoint.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Current connection state.
    pub fn connection_state(&self) -> ConnectionState {
        self.connection.borrow().state
    }

    /// Whether the channel is up.
    pub fn is_connected(&self) -> bool {
        self.connection_state().is_connected()
    }

    /// Observe connection state changes.
    pub fn watch_connection(&self) -> ConnectionWatch {
        ConnectionWatch {
            rx: self.connection.subscribe(),
        }
    }

    /// Identity the open channel is bound to.
    pub async fn identity(&self) -> Option<Identity> {
        self.session
            .lock()
            .await
            .as_ref()
            .map(|session| session.identity.clone())
    }

    /// Apply an identity change.
    ///
    /// Returns the transition that was performed. Calls are serialized, so
    /// a switch never overlaps another switch.
    pub async fn set_identity(&self, next: Option<Identity>) -> Transition {
        let mut session = self.session.lock().await;
        let transition = Transition::between(
            session.as_ref().map(|s| &s.identity),
            next.as_ref(),
        );

        match &transition {
            Transition::Unchanged => {}
            Transition::Close => {
                if let Some(identity) = session.as_ref().map(|s| s.identity.clone()) {
                    log::info!("Session ended for {}", identity);
                }
                self.teardown(session.take()).await;
            }
            Transition::Open(identity) => {
                *session = self.open(identity.clone()).await;
            }
            Transition::Switch(identity) => {
                log::info!("Identity changed, reconnecting as {}", identity);
                self.teardown(session.take()).await;
                *session = self.open(identity.clone()).await;
            }
        }
        transition
    }

    /// Tear down the channel and empty the store, as on logout.
    pub async fn shutdown(&self) {
        self.set_identity(None).await;
    }

    /// Start a session for `identity` under a fresh store generation.
    ///
    /// `None` when the transport refuses to connect; the identity stays
    /// unbound so the next `set_identity` retries.
    async fn open(&self, identity: Identity) -> Option<Session> {
        let generation = self.store.reset();
        self.connection.send_replace(Tracked {
            generation,
            state: ConnectionState::Connecting,
        });

        log::info!("Opening notification channel for {}", identity);
        let mut transport = self.connector.open(&self.endpoint);
        let cancel = CancellationToken::new();

        if let Err(e) = transport.connect().await {
            log::warn!("Notification channel unavailable: {}", e);
            publish(&self.connection, generation, ConnectionState::Disconnected);
            return None;
        }

        let pump = transport.take_events().map(|events| {
            let ingestor = EventIngestor::new(self.store.clone(), self.effects.clone(), generation)
                .require_authentication(self.require_authentication);
            tokio::spawn(run_pump(
                events,
                transport.sender(),
                identity.clone(),
                ingestor,
                Arc::clone(&self.connection),
                cancel.clone(),
            ))
        });

        Some(Session {
            identity,
            generation,
            transport,
            cancel,
            pump,
        })
    }

    /// Close `session` (if any), empty the store and publish `Disconnected`.
    async fn teardown(&self, session: Option<Session>) {
        if let Some(mut session) = session {
            session.cancel.cancel();
            if let Some(pump) = session.pump.take() {
                pump.abort();
            }
            session.transport.disconnect().await;
            log::debug!("Session generation {} closed", session.generation);
        }

        let generation = self.store.reset();
        self.connection.send_replace(Tracked {
            generation,
            state: ConnectionState::Disconnected,
        });
    }
}

impl<C: Connector> Drop for LifecycleController<C> {
    fn drop(&mut self) {
        if let Some(session) = self.session.get_mut().take() {
            session.cancel.cancel();
            if let Some(pump) = session.pump {
                pump.abort();
            }
            // Transport drop cancels its own background work.
            drop(session.transport);
        }

        let generation = self.store.reset();
        self.connection.send_replace(Tracked {
            generation,
            state: ConnectionState::Disconnected,
        });
    }
}

/// Per-session event pump. Applies transport events one at a time until
/// cancelled or the transport's queue closes.
async fn run_pump(
    mut events: mpsc::Receiver<TransportEvent>,
    sender: Option<EmitHandle>,
    identity: Identity,
    ingestor: EventIngestor,
    connection: Arc<watch::Sender<Tracked>>,
    cancel: CancellationToken,
) {
    let generation = ingestor.generation();
    let mut authenticated = false;

    loop {
        let event = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            event = events.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };
        if cancel.is_cancelled() {
            break;
        }

        match event {
            TransportEvent::Connecting => {
                authenticated = false;
                publish(&connection, generation, ConnectionState::Connecting);
            }
            TransportEvent::Connected(kind) => {
                authenticated = false;
                publish(&connection, generation, ConnectionState::ConnectedUnauthenticated);
                log::info!("Channel up over {}, authenticating as {}", kind, identity);
                match &sender {
                    Some(sender) => {
                        if let Err(e) = sender.emit(ClientEvent::authenticate(&identity)).await {
                            log::warn!("Failed to send handshake for {}: {}", identity, e);
                        }
                    }
                    None => log::warn!("No outbound channel, handshake skipped"),
                }
            }
            TransportEvent::Disconnected { reason } => {
                authenticated = false;
                publish(&connection, generation, ConnectionState::Disconnected);
                log::warn!("Notification channel lost: {}", reason);
            }
            TransportEvent::Message(ServerEvent::Authenticated(ack)) => {
                if ack.success {
                    authenticated = true;
                    publish(&connection, generation, ConnectionState::Authenticated);
                    log::info!("Authenticated as {}", identity);
                } else {
                    log::warn!("Server did not accept the handshake for {}", identity);
                }
            }
            TransportEvent::Message(ServerEvent::AuthenticationError(err)) => {
                log::warn!("Authentication failed for {}: {}", identity, err.error);
            }
            TransportEvent::Message(ServerEvent::Notification(incoming)) => {
                ingestor.ingest(incoming, authenticated);
            }
        }
    }

    log::debug!("Event pump for generation {} stopped", generation);
}
