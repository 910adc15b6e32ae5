//! Network transport with transport negotiation and reconnection.
//!
//! [`SocketTransport`] spawns one background task per `connect`. The task
//! owns the wire and loops:
//!
//! ```text
//! loop {
//!     for kind in endpoint.transports {        // websocket, then polling
//!         open kind (bounded by connect_timeout)
//!     }
//!     first success → Connected(kind) → run session until it drops
//!     back off (doubling, capped, jittered) → retry
//! }
//! ```
//!
//! Outbound events queued while no session is up are discarded before the
//! next `Connected` is reported, so nothing crosses a disconnect window.

// Rust guideline compliant 2026-02

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::polling::PollSession;
use super::websocket::WsSession;
use super::{
    Backoff, Connector, EmitHandle, Endpoint, SessionEnd, SharedTransportState, Transport,
    TransportError, TransportEvent, TransportKind, TransportState,
};
use crate::constants::{
    DISCONNECT_GRACE, EMIT_QUEUE_CAPACITY, EVENT_QUEUE_CAPACITY, POLL_REQUEST_TIMEOUT,
};
use crate::protocol::ClientEvent;

/// Builds [`SocketTransport`]s sharing one HTTP client.
#[derive(Debug, Clone)]
pub struct SocketConnector {
    client: reqwest::Client,
}

impl Default for SocketConnector {
    fn default() -> Self {
        let client = reqwest::Client::builder()
            .timeout(POLL_REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                log::warn!("Falling back to default HTTP client: {}", e);
                reqwest::Client::new()
            });
        Self { client }
    }
}

impl Connector for SocketConnector {
    fn open(&self, endpoint: &Endpoint) -> Box<dyn Transport> {
        Box::new(SocketTransport::new(endpoint.clone(), self.client.clone()))
    }
}

/// A live session over one of the negotiated transports.
#[derive(Debug)]
enum ActiveSession {
    Websocket(WsSession),
    Polling(PollSession),
}

impl ActiveSession {
    fn kind(&self) -> TransportKind {
        match self {
            Self::Websocket(_) => TransportKind::Websocket,
            Self::Polling(_) => TransportKind::Polling,
        }
    }

    async fn run(
        self,
        emit_rx: &mut mpsc::Receiver<ClientEvent>,
        events_tx: &mpsc::Sender<TransportEvent>,
        shutdown: &CancellationToken,
    ) -> SessionEnd {
        match self {
            Self::Websocket(session) => session.run(emit_rx, events_tx, shutdown).await,
            Self::Polling(session) => session.run(emit_rx, events_tx, shutdown).await,
        }
    }
}

/// Production transport: WebSocket with HTTP long-polling fallback.
#[derive(Debug)]
pub struct SocketTransport {
    endpoint: Endpoint,
    client: reqwest::Client,
    state: Arc<SharedTransportState>,
    emit_tx: Option<mpsc::Sender<ClientEvent>>,
    events_rx: Option<mpsc::Receiver<TransportEvent>>,
    shutdown: Option<CancellationToken>,
    task: Option<JoinHandle<()>>,
}

impl SocketTransport {
    /// Create an unconnected transport.
    pub fn new(endpoint: Endpoint, client: reqwest::Client) -> Self {
        Self {
            endpoint,
            client,
            state: SharedTransportState::new(),
            emit_tx: None,
            events_rx: None,
            shutdown: None,
            task: None,
        }
    }

    /// Endpoint this transport connects to.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Open one transport, bounded by the endpoint's connect timeout.
    async fn open_kind(
        kind: TransportKind,
        endpoint: &Endpoint,
        client: &reqwest::Client,
    ) -> Result<ActiveSession, TransportError> {
        let attempt = async {
            match kind {
                TransportKind::Websocket => {
                    WsSession::open(endpoint).await.map(ActiveSession::Websocket)
                }
                TransportKind::Polling => PollSession::open(client, endpoint)
                    .await
                    .map(ActiveSession::Polling),
            }
        };
        tokio::time::timeout(endpoint.connect_timeout, attempt)
            .await
            .unwrap_or(Err(TransportError::Timeout))
    }

    /// Try each configured transport in order; first success wins.
    async fn open_session(endpoint: &Endpoint, client: &reqwest::Client) -> Option<ActiveSession> {
        for &kind in &endpoint.transports {
            match Self::open_kind(kind, endpoint, client).await {
                Ok(session) => return Some(session),
                Err(TransportError::Timeout) => log::warn!(
                    "{} transport timed out after {}ms",
                    kind,
                    endpoint.connect_timeout.as_millis()
                ),
                Err(e) => log::warn!("{} transport unavailable: {}", kind, e),
            }
        }
        None
    }

    /// Background connection loop with exponential backoff.
    async fn run_connection_loop(
        endpoint: Endpoint,
        client: reqwest::Client,
        state: Arc<SharedTransportState>,
        mut emit_rx: mpsc::Receiver<ClientEvent>,
        events_tx: mpsc::Sender<TransportEvent>,
        shutdown: CancellationToken,
    ) {
        let mut delay = endpoint.backoff.initial;
        let mut attempt: u32 = 0;

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            state.set(TransportState::Connecting);
            if events_tx.send(TransportEvent::Connecting).await.is_err() {
                break;
            }

            let opened = tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                session = Self::open_session(&endpoint, &client) => session,
            };

            if let Some(session) = opened {
                let kind = session.kind();
                log::info!("Connected to {} over {}", endpoint.server_url, kind);

                // Discard anything queued while the channel was down.
                while emit_rx.try_recv().is_ok() {}

                state.set(TransportState::Connected(kind));
                delay = endpoint.backoff.initial;
                attempt = 0;
                if events_tx.send(TransportEvent::Connected(kind)).await.is_err() {
                    break;
                }

                match session.run(&mut emit_rx, &events_tx, &shutdown).await {
                    SessionEnd::Shutdown => break,
                    SessionEnd::Dropped(reason) => {
                        log::warn!("Disconnected from {}: {}", endpoint.server_url, reason);
                        if events_tx
                            .send(TransportEvent::Disconnected { reason })
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                }
            }

            attempt = attempt.saturating_add(1);
            let wait = Backoff::with_jitter(delay);
            state.set(TransportState::Reconnecting {
                attempt,
                next_retry_ms: wait.as_millis() as u64,
            });
            log::info!(
                "Reconnecting to {} in {:.1}s (attempt {})...",
                endpoint.server_url,
                wait.as_secs_f32(),
                attempt
            );

            tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                () = tokio::time::sleep(wait) => {}
            }

            delay = endpoint.backoff.next(delay);
        }

        state.set(TransportState::Disconnected);
        log::debug!("Connection loop for {} stopped", endpoint.server_url);
    }
}

#[async_trait]
impl Transport for SocketTransport {
    async fn connect(&mut self) -> Result<(), TransportError> {
        if self.task.is_some() {
            return Ok(());
        }
        if self.endpoint.transports.is_empty() {
            return Err(TransportError::ConnectionFailed(
                "no transports configured".to_string(),
            ));
        }

        let (emit_tx, emit_rx) = mpsc::channel(EMIT_QUEUE_CAPACITY);
        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        let shutdown = CancellationToken::new();

        self.state.set(TransportState::Connecting);
        self.emit_tx = Some(emit_tx);
        self.events_rx = Some(events_rx);
        self.shutdown = Some(shutdown.clone());
        self.task = Some(tokio::spawn(Self::run_connection_loop(
            self.endpoint.clone(),
            self.client.clone(),
            Arc::clone(&self.state),
            emit_rx,
            events_tx,
            shutdown,
        )));

        Ok(())
    }

    async fn disconnect(&mut self) {
        if let Some(token) = self.shutdown.take() {
            token.cancel();
        }
        self.emit_tx = None;
        self.events_rx = None;

        if let Some(mut task) = self.task.take() {
            if tokio::time::timeout(DISCONNECT_GRACE, &mut task).await.is_err() {
                log::debug!("Connection task did not stop in time, aborting");
                task.abort();
            }
        }
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

impl Drop for SocketTransport {
    fn drop(&mut self) {
        if let Some(token) = self.shutdown.take() {
            token.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn unreachable_endpoint() -> Endpoint {
        let mut endpoint = Endpoint::new("http://127.0.0.1:1");
        endpoint.backoff = Backoff {
            initial: Duration::from_millis(10),
            max: Duration::from_millis(20),
        };
        endpoint.connect_timeout = Duration::from_millis(500);
        endpoint
    }

    #[tokio::test]
    async fn test_connect_without_transports_fails() {
        let mut endpoint = unreachable_endpoint();
        endpoint.transports.clear();
        let mut transport = SocketTransport::new(endpoint, reqwest::Client::new());

        let result = transport.connect().await;
        assert!(matches!(result, Err(TransportError::ConnectionFailed(_))));
        assert!(transport.sender().is_none());
    }

    #[tokio::test]
    async fn test_connect_is_idempotent() {
        let mut transport = SocketTransport::new(unreachable_endpoint(), reqwest::Client::new());
        transport.connect().await.unwrap();
        let events = transport.take_events();
        assert!(events.is_some());

        // A second connect must not replace the running loop.
        transport.connect().await.unwrap();
        assert!(transport.take_events().is_none());

        transport.disconnect().await;
    }

    #[tokio::test]
    async fn test_unreachable_server_schedules_reconnect() {
        let mut transport = SocketTransport::new(unreachable_endpoint(), reqwest::Client::new());
        transport.connect().await.unwrap();
        let mut events = transport.take_events().unwrap();

        assert_eq!(events.recv().await, Some(TransportEvent::Connecting));

        let reconnecting = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if matches!(transport.state(), TransportState::Reconnecting { .. }) {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        assert!(reconnecting.is_ok(), "expected a scheduled reconnect");

        transport.disconnect().await;
        assert_eq!(transport.state(), TransportState::Disconnected);
        assert!(transport.sender().is_none());
    }

    #[tokio::test]
    async fn test_silent_server_times_out() {
        // Accepts TCP but never answers the upgrade.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (_stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let mut endpoint = Endpoint::new(format!("http://{addr}"));
        endpoint.connect_timeout = Duration::from_millis(100);
        let result = SocketTransport::open_kind(
            TransportKind::Websocket,
            &endpoint,
            &reqwest::Client::new(),
        )
        .await;
        assert!(matches!(result, Err(TransportError::Timeout)));

        server.abort();
    }

    #[tokio::test]
    async fn test_connector_builds_fresh_transports() {
        let connector = SocketConnector::default();
        let endpoint = unreachable_endpoint();
        let first = connector.open(&endpoint);
        let second = connector.open(&endpoint);
        assert_eq!(first.state(), TransportState::Disconnected);
        assert_eq!(second.state(), TransportState::Disconnected);
    }
}
