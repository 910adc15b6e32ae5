//! In-process transport for headless use and tests.
//!
//! [`MemoryConnector`] hands out [`MemoryTransport`]s. Each connected
//! transport registers a [`MemoryLink`], the "server side" of the channel:
//! the link accepts the connection, pushes server events and reads what the
//! client emitted.
//!
//! ```ignore
//! let connector = MemoryConnector::new();
//! let controller = LifecycleController::with_connector(endpoint, connector.clone(), ..);
//! controller.set_identity(Some(identity)).await;
//!
//! let link = connector.wait_for_link(0, Duration::from_secs(1)).await.unwrap();
//! link.accept().await;
//! let handshake = link.next_client_event(Duration::from_secs(1)).await;
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex, Notify};

use super::{
    Connector, EmitHandle, Endpoint, SharedTransportState, Transport, TransportError,
    TransportEvent, TransportKind, TransportState,
};
use crate::constants::{EMIT_QUEUE_CAPACITY, EVENT_QUEUE_CAPACITY};
use crate::protocol::{ClientEvent, ServerEvent};

#[derive(Debug, Default)]
struct LinkRegistry {
    links: StdMutex<Vec<Arc<MemoryLink>>>,
    added: Notify,
}

impl LinkRegistry {
    fn register(&self, link: Arc<MemoryLink>) {
        if let Ok(mut links) = self.links.lock() {
            links.push(link);
        }
        self.added.notify_waiters();
    }

    fn get(&self, index: usize) -> Option<Arc<MemoryLink>> {
        self.links
            .lock()
            .ok()
            .and_then(|links| links.get(index).cloned())
    }

    fn len(&self) -> usize {
        self.links.lock().map(|links| links.len()).unwrap_or(0)
    }
}

/// Builds [`MemoryTransport`]s and records every link they open.
#[derive(Debug, Clone, Default)]
pub struct MemoryConnector {
    registry: Arc<LinkRegistry>,
}

impl MemoryConnector {
    /// Create a connector with no links.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of links opened so far.
    pub fn link_count(&self) -> usize {
        self.registry.len()
    }

    /// Link opened by the `index`-th connect, if any.
    pub fn link(&self, index: usize) -> Option<Arc<MemoryLink>> {
        self.registry.get(index)
    }

    /// Wait until the `index`-th link exists.
    pub async fn wait_for_link(&self, index: usize, timeout: Duration) -> Option<Arc<MemoryLink>> {
        tokio::time::timeout(timeout, async {
            loop {
                // Register interest before checking to avoid a lost wakeup.
                let added = self.registry.added.notified();
                if let Some(link) = self.registry.get(index) {
                    return link;
                }
                added.await;
            }
        })
        .await
        .ok()
    }
}

impl Connector for MemoryConnector {
    fn open(&self, _endpoint: &Endpoint) -> Box<dyn Transport> {
        Box::new(MemoryTransport::new(Arc::clone(&self.registry)))
    }
}

/// Server side of one in-process channel.
#[derive(Debug)]
pub struct MemoryLink {
    events_tx: mpsc::Sender<TransportEvent>,
    client_rx: Mutex<mpsc::Receiver<ClientEvent>>,
    state: Arc<SharedTransportState>,
    closed: AtomicBool,
}

impl MemoryLink {
    /// Complete the connection. Returns `false` once the client is gone.
    pub async fn accept(&self) -> bool {
        self.state.set(TransportState::Connected(TransportKind::Websocket));
        self.push_event(TransportEvent::Connected(TransportKind::Websocket))
            .await
    }

    /// Deliver a server event to the client.
    pub async fn push(&self, event: ServerEvent) -> bool {
        self.push_event(TransportEvent::Message(event)).await
    }

    /// Deliver a raw transport event to the client.
    pub async fn push_event(&self, event: TransportEvent) -> bool {
        self.events_tx.send(event).await.is_ok()
    }

    /// Simulate a network drop. The client is told it is disconnected.
    pub async fn drop_connection(&self, reason: &str) -> bool {
        self.state.set(TransportState::Reconnecting {
            attempt: 1,
            next_retry_ms: 0,
        });
        self.push_event(TransportEvent::Disconnected {
            reason: reason.to_string(),
        })
        .await
    }

    /// Next event the client emitted, waiting at most `timeout`.
    pub async fn next_client_event(&self, timeout: Duration) -> Option<ClientEvent> {
        let mut rx = self.client_rx.lock().await;
        tokio::time::timeout(timeout, rx.recv()).await.ok().flatten()
    }

    /// Whether the client disconnected this link.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Client side of an in-process channel.
#[derive(Debug)]
pub struct MemoryTransport {
    registry: Arc<LinkRegistry>,
    state: Arc<SharedTransportState>,
    link: Option<Arc<MemoryLink>>,
    emit_tx: Option<mpsc::Sender<ClientEvent>>,
    events_rx: Option<mpsc::Receiver<TransportEvent>>,
}

impl MemoryTransport {
    fn new(registry: Arc<LinkRegistry>) -> Self {
        Self {
            registry,
            state: SharedTransportState::new(),
            link: None,
            emit_tx: None,
            events_rx: None,
        }
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn connect(&mut self) -> Result<(), TransportError> {
        if self.link.is_some() {
            return Ok(());
        }

        let (emit_tx, client_rx) = mpsc::channel(EMIT_QUEUE_CAPACITY);
        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);

        self.state.set(TransportState::Connecting);
        events_tx
            .try_send(TransportEvent::Connecting)
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        let link = Arc::new(MemoryLink {
            events_tx,
            client_rx: Mutex::new(client_rx),
            state: Arc::clone(&self.state),
            closed: AtomicBool::new(false),
        });
        self.registry.register(Arc::clone(&link));

        self.link = Some(link);
        self.emit_tx = Some(emit_tx);
        self.events_rx = Some(events_rx);
        Ok(())
    }

    async fn disconnect(&mut self) {
        if let Some(link) = self.link.take() {
            link.closed.store(true, Ordering::SeqCst);
        }
        self.emit_tx = None;
        self.events_rx = None;
        self.state.set(TransportState::Disconnected);
    }

    fn state(&self) -> TransportState {
        self.state.get()
    }

    fn sender(&self) -> Option<EmitHandle> {
        self.emit_tx.clone().map(EmitHandle::new)
    }

    fn take_events(&mut self) -> Option<mpsc::Receiver<TransportEvent>> {
        self.events_rx.take()
    }
}

impl Drop for MemoryTransport {
    fn drop(&mut self) {
        if let Some(link) = self.link.take() {
            link.closed.store(true, Ordering::SeqCst);
        }
    }
}
