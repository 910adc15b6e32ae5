//! Transport abstraction for the notification channel.
//!
//! This module provides a unified [`Transport`] trait for the persistent
//! bidirectional channel between a client and the notification server.
//!
//! # Architecture
//!
//! ```text
//! Transport (trait)
//!     │
//!     ├── SocketTransport (production)
//!     │   ├── WebSocket upgrade      (preferred, full duplex)
//!     │   ├── HTTP long-polling      (fallback through restrictive proxies)
//!     │   └── Reconnection           (exponential backoff with jitter)
//!     │
//!     └── MemoryTransport (headless/tests)
//!         └── In-process queues driven by a MemoryLink
//! ```
//!
//! A transport reports what happens on the wire as [`TransportEvent`]s on a
//! queue obtained once via [`Transport::take_events`], and accepts outbound
//! [`ClientEvent`]s through a cloneable [`EmitHandle`].
//!
//! # Usage
//!
//! ```ignore
//! let mut transport = SocketConnector.open(&endpoint);
//! transport.connect().await?;
//! let mut events = transport.take_events().expect("connected");
//! let sender = transport.sender().expect("connected");
//!
//! while let Some(event) = events.recv().await {
//!     if let TransportEvent::Connected(_) = event {
//!         sender.emit(ClientEvent::authenticate(&identity)).await?;
//!     }
//! }
//! ```
//!
//! Rust guideline compliant 2026-02

pub mod memory;
pub mod polling;
pub mod socket;
pub mod websocket;

use std::str::FromStr;
use std::sync::{Arc, RwLock as StdRwLock};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::config::Config;
use crate::constants::{
    BACKOFF_JITTER_MS, CONNECT_TIMEOUT, INITIAL_BACKOFF, MAX_BACKOFF, POLL_INTERVAL,
};
use crate::protocol::{ClientEvent, ServerEvent};

pub use memory::{MemoryConnector, MemoryLink, MemoryTransport};
pub use socket::{SocketConnector, SocketTransport};

/// Wire transports, in the order they may be negotiated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Full-duplex WebSocket upgrade.
    Websocket,
    /// HTTP long-polling request fallback.
    Polling,
}

impl TransportKind {
    /// Config/log name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Websocket => "websocket",
            Self::Polling => "polling",
        }
    }
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "websocket" | "ws" => Ok(Self::Websocket),
            "polling" | "poll" => Ok(Self::Polling),
            other => Err(format!("unknown transport '{other}'")),
        }
    }
}

/// Transport-level connection state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TransportState {
    /// Not connected and not trying.
    #[default]
    Disconnected,
    /// Attempting to connect.
    Connecting,
    /// Connected over the given transport.
    Connected(TransportKind),
    /// Waiting before the next attempt.
    Reconnecting {
        /// Consecutive failed attempts so far.
        attempt: u32,
        /// Milliseconds until next retry.
        next_retry_ms: u64,
    },
}

impl TransportState {
    /// Whether events can currently be delivered.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected(_))
    }
}

/// What a transport reports to its owner.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// A connection attempt started.
    Connecting,
    /// The channel is up. Fired again after every reconnect.
    Connected(TransportKind),
    /// The channel dropped; the transport will retry on its own.
    Disconnected {
        /// Human-readable cause.
        reason: String,
    },
    /// An inbound server message.
    Message(ServerEvent),
}

/// Errors that can occur during transport operations.
#[derive(Debug)]
pub enum TransportError {
    /// Failed to establish connection.
    ConnectionFailed(String),
    /// Failed to send a message.
    SendFailed(String),
    /// The peer violated the wire protocol.
    Protocol(String),
    /// The transport is closed.
    Closed,
    /// Operation timed out.
    Timeout,
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ConnectionFailed(msg) => write!(f, "Connection failed: {msg}"),
            Self::SendFailed(msg) => write!(f, "Send failed: {msg}"),
            Self::Protocol(msg) => write!(f, "Protocol error: {msg}"),
            Self::Closed => write!(f, "Transport closed"),
            Self::Timeout => write!(f, "Operation timed out"),
        }
    }
}

impl std::error::Error for TransportError {}

/// Cloneable handle for sending client events through a transport.
///
/// Events emitted while the channel is down are discarded when the next
/// connection comes up; nothing is replayed across a disconnect.
#[derive(Debug, Clone)]
pub struct EmitHandle {
    tx: mpsc::Sender<ClientEvent>,
}

impl EmitHandle {
    pub(crate) fn new(tx: mpsc::Sender<ClientEvent>) -> Self {
        Self { tx }
    }

    /// Queue an event for sending.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Closed` if the transport was disconnected.
    pub async fn emit(&self, event: ClientEvent) -> Result<(), TransportError> {
        self.tx.send(event).await.map_err(|_| TransportError::Closed)
    }
}

/// A persistent bidirectional channel to the notification server.
#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    /// Start connecting. Calling this while connecting or connected is a
    /// no-op.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::ConnectionFailed` if the transport cannot
    /// start at all (e.g. no transports configured). Network failures are
    /// retried internally and reported as events instead.
    async fn connect(&mut self) -> Result<(), TransportError>;

    /// Close the channel, cancel pending retries and release all resources.
    ///
    /// No event is delivered after this returns.
    async fn disconnect(&mut self);

    /// Current transport state.
    fn state(&self) -> TransportState;

    /// Handle for outbound events. `None` before `connect`.
    fn sender(&self) -> Option<EmitHandle>;

    /// Take the inbound event queue. Returns `None` before `connect` or if
    /// already taken.
    fn take_events(&mut self) -> Option<mpsc::Receiver<TransportEvent>>;
}

/// Builds a fresh transport for each channel the controller opens.
pub trait Connector: Send + Sync {
    /// Create an unconnected transport for `endpoint`.
    fn open(&self, endpoint: &Endpoint) -> Box<dyn Transport>;
}

/// Reconnection delay policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    /// First delay.
    pub initial: Duration,
    /// Upper bound.
    pub max: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial: INITIAL_BACKOFF,
            max: MAX_BACKOFF,
        }
    }
}

impl Backoff {
    /// Delay following `current`: doubled, capped at `max`.
    pub fn next(&self, current: Duration) -> Duration {
        current.saturating_mul(2).min(self.max)
    }

    /// `delay` plus up to [`BACKOFF_JITTER_MS`] of random jitter.
    pub fn with_jitter(delay: Duration) -> Duration {
        delay + Duration::from_millis(rand::random::<u64>() % BACKOFF_JITTER_MS)
    }
}

/// Where and how to reach the notification server.
#[derive(Debug, Clone)]
pub struct Endpoint {
    /// Server base URL (`http(s)://` or `ws(s)://`).
    pub server_url: String,
    /// Path prefix of the notification endpoints.
    pub path: String,
    /// Transports to try, in order.
    pub transports: Vec<TransportKind>,
    /// Reconnection policy.
    pub backoff: Backoff,
    /// Timeout for a single transport handshake.
    pub connect_timeout: Duration,
    /// Delay between polls after an empty batch.
    pub poll_interval: Duration,
}

impl Endpoint {
    /// Endpoint with default transports and timings.
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            path: "/notifications".to_string(),
            transports: vec![TransportKind::Websocket, TransportKind::Polling],
            backoff: Backoff::default(),
            connect_timeout: CONNECT_TIMEOUT,
            poll_interval: POLL_INTERVAL,
        }
    }

    /// `server_url` + `path` + `suffix`, without duplicate slashes.
    pub fn url(&self, suffix: &str) -> String {
        [
            self.server_url.trim_end_matches('/'),
            self.path.trim_matches('/'),
            suffix.trim_start_matches('/'),
        ]
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("/")
    }
}

impl From<&Config> for Endpoint {
    fn from(config: &Config) -> Self {
        Self {
            server_url: config.server_url.clone(),
            path: config.path.clone(),
            transports: config.transports.clone(),
            backoff: Backoff {
                initial: Duration::from_millis(config.initial_backoff_ms),
                max: Duration::from_millis(config.max_backoff_ms),
            },
            connect_timeout: Duration::from_millis(config.connect_timeout_ms),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
        }
    }
}

/// How a transport session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SessionEnd {
    /// Shutdown requested or owner gone; do not reconnect.
    Shutdown,
    /// Connection lost; reconnect after backoff.
    Dropped(String),
}

/// Transport state shared between the owner and the connection task.
#[derive(Debug, Default)]
pub struct SharedTransportState {
    state: StdRwLock<TransportState>,
}

impl SharedTransportState {
    /// Create new shared state.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Get the current state.
    pub fn get(&self) -> TransportState {
        self.state
            .read()
            .map(|s| s.clone())
            .unwrap_or(TransportState::Disconnected)
    }

    /// Set the state.
    pub fn set(&self, new_state: TransportState) {
        if let Ok(mut guard) = self.state.write() {
            *guard = new_state;
        }
    }

    /// Check if connected.
    pub fn is_connected(&self) -> bool {
        self.get().is_connected()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let backoff = Backoff {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(30),
        };
        let mut delay = backoff.initial;
        let mut seen = Vec::new();
        for _ in 0..7 {
            seen.push(delay.as_secs());
            delay = backoff.next(delay);
        }
        assert_eq!(seen, vec![1, 2, 4, 8, 16, 30, 30]);
    }

    #[test]
    fn test_jitter_is_bounded() {
        for _ in 0..100 {
            let d = Backoff::with_jitter(Duration::from_secs(1));
            assert!(d >= Duration::from_secs(1));
            assert!(d < Duration::from_millis(1000 + BACKOFF_JITTER_MS));
        }
    }

    #[test]
    fn test_transport_kind_parse() {
        assert_eq!("WebSocket".parse(), Ok(TransportKind::Websocket));
        assert_eq!("poll".parse(), Ok(TransportKind::Polling));
        assert!("carrier-pigeon".parse::<TransportKind>().is_err());
    }

    #[test]
    fn test_endpoint_url_joins_cleanly() {
        let mut endpoint = Endpoint::new("https://example.com/");
        assert_eq!(endpoint.url("/ws"), "https://example.com/notifications/ws");

        endpoint.path = "/api/notifications/".to_string();
        assert_eq!(
            endpoint.url("/poll/open"),
            "https://example.com/api/notifications/poll/open"
        );

        let mut endpoint = Endpoint::new("http://localhost:3000");
        assert_eq!(endpoint.url("/poll"), "http://localhost:3000/notifications/poll");

        endpoint.path = String::new();
        assert_eq!(endpoint.url("/ws"), "http://localhost:3000/ws");
    }

    #[test]
    fn test_shared_state_roundtrip() {
        let shared = SharedTransportState::new();
        assert!(!shared.is_connected());
        shared.set(TransportState::Connected(TransportKind::Polling));
        assert!(shared.is_connected());
        assert_eq!(shared.get(), TransportState::Connected(TransportKind::Polling));
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            TransportError::ConnectionFailed("refused".into()).to_string(),
            "Connection failed: refused"
        );
        assert_eq!(TransportError::Closed.to_string(), "Transport closed");
    }
}
