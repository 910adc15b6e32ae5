//! WebSocket transport.
//!
//! Thin wrapper around `tokio-tungstenite` providing type-isolated
//! reader/writer halves and the per-connection message loop.
//!
//! # Architecture
//!
//! [`connect`] handles URL scheme conversion and the upgrade handshake and
//! returns a ([`WsWriter`], [`WsReader`]) pair. [`WsSession`] owns both halves
//! for one connection and runs until the socket drops or shutdown is
//! requested:
//!
//! ```text
//! select! {
//!     shutdown        → close frame, SessionEnd::Shutdown
//!     outbound event  → text frame
//!     inbound frame   → ServerEvent → TransportEvent::Message
//!     health tick     → ping, or drop if stale
//! }
//! ```

// Rust guideline compliant 2026-02

use std::time::Instant;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;

use super::{Endpoint, SessionEnd, TransportError, TransportEvent};
use crate::constants::{CONNECTION_STALE_TIMEOUT, HEALTH_CHECK_INTERVAL};
use crate::protocol::{ClientEvent, ServerEvent};

/// Concrete WebSocket stream type (avoids repeating the generic everywhere).
type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

/// Received WebSocket frame.
#[derive(Debug)]
pub enum WsFrame {
    /// UTF-8 text frame.
    Text(String),
    /// Binary frame (unused by the protocol, ignored).
    Binary(Vec<u8>),
    /// Ping frame with payload.
    Ping(Vec<u8>),
    /// Pong frame with payload.
    Pong(Vec<u8>),
    /// Close frame with status code and reason.
    Close {
        /// WebSocket close code (1000 = normal, 1005 = no code).
        code: u16,
        /// Human-readable close reason.
        reason: String,
    },
}

/// Write half of a WebSocket connection.
#[derive(Debug)]
pub struct WsWriter {
    sink: futures_util::stream::SplitSink<WsStream, tungstenite::Message>,
}

impl WsWriter {
    /// Send a client event as a text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or the send fails.
    pub async fn send_event(&mut self, event: &ClientEvent) -> Result<(), TransportError> {
        let text = event
            .encode()
            .map_err(|e| TransportError::SendFailed(format!("encode failed: {e}")))?;
        self.sink
            .send(tungstenite::Message::Text(text))
            .await
            .map_err(|e| TransportError::SendFailed(format!("WebSocket send failed: {e}")))
    }

    /// Send a ping frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the send fails.
    pub async fn send_ping(&mut self) -> Result<(), TransportError> {
        self.sink
            .send(tungstenite::Message::Ping(Vec::new()))
            .await
            .map_err(|e| TransportError::SendFailed(format!("WebSocket ping failed: {e}")))
    }

    /// Send a pong frame in response to a ping.
    ///
    /// # Errors
    ///
    /// Returns an error if the send fails.
    pub async fn send_pong(&mut self, data: Vec<u8>) -> Result<(), TransportError> {
        self.sink
            .send(tungstenite::Message::Pong(data))
            .await
            .map_err(|e| TransportError::SendFailed(format!("WebSocket pong failed: {e}")))
    }

    /// Send a close frame and flush.
    ///
    /// # Errors
    ///
    /// Returns an error if closing fails.
    pub async fn close(&mut self) -> Result<(), TransportError> {
        self.sink
            .close()
            .await
            .map_err(|e| TransportError::SendFailed(format!("WebSocket close failed: {e}")))
    }
}

/// Read half of a WebSocket connection.
#[derive(Debug)]
pub struct WsReader {
    stream: futures_util::stream::SplitStream<WsStream>,
}

impl WsReader {
    /// Receive the next frame, returning `None` when the stream ends.
    ///
    /// Raw `Frame` variants are skipped internally.
    pub async fn recv(&mut self) -> Option<Result<WsFrame, TransportError>> {
        loop {
            let frame = match self.stream.next().await? {
                Ok(tungstenite::Message::Text(text)) => WsFrame::Text(text),
                Ok(tungstenite::Message::Binary(data)) => WsFrame::Binary(data),
                Ok(tungstenite::Message::Ping(data)) => WsFrame::Ping(data),
                Ok(tungstenite::Message::Pong(data)) => WsFrame::Pong(data),
                Ok(tungstenite::Message::Close(close_frame)) => {
                    let (code, reason) = close_frame
                        .map(|cf| (cf.code.into(), cf.reason.to_string()))
                        .unwrap_or((1005, String::new()));
                    WsFrame::Close { code, reason }
                }
                Ok(tungstenite::Message::Frame(_)) => continue,
                Err(e) => {
                    return Some(Err(TransportError::Protocol(format!(
                        "WebSocket read error: {e}"
                    ))))
                }
            };
            return Some(Ok(frame));
        }
    }
}

/// Connect to a WebSocket URL.
///
/// # Errors
///
/// Returns an error if the URL is invalid or the upgrade handshake fails.
pub async fn connect(url: &str) -> Result<(WsWriter, WsReader), TransportError> {
    use tungstenite::client::IntoClientRequest;

    let request = url
        .into_client_request()
        .map_err(|e| TransportError::ConnectionFailed(format!("invalid WebSocket URL {url}: {e}")))?;

    let (ws_stream, _response) = tokio_tungstenite::connect_async(request)
        .await
        .map_err(|e| TransportError::ConnectionFailed(format!("WebSocket upgrade failed: {e}")))?;

    let (sink, stream) = ws_stream.split();
    Ok((WsWriter { sink }, WsReader { stream }))
}

/// Convert an HTTP(S) URL to WS(S) scheme.
///
/// Passes `ws://` and `wss://` through unchanged.
pub fn http_to_ws_scheme(url: &str) -> String {
    if let Some(rest) = url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        url.to_string()
    }
}

/// WebSocket URL for `endpoint`.
pub fn socket_url(endpoint: &Endpoint) -> String {
    http_to_ws_scheme(&endpoint.url("/ws"))
}

/// One live WebSocket connection.
#[derive(Debug)]
pub struct WsSession {
    writer: WsWriter,
    reader: WsReader,
}

impl WsSession {
    /// Open a connection to `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns an error if the upgrade fails.
    pub async fn open(endpoint: &Endpoint) -> Result<Self, TransportError> {
        let url = socket_url(endpoint);
        log::debug!("Connecting WebSocket: {}", url);
        let (writer, reader) = connect(&url).await?;
        Ok(Self { writer, reader })
    }

    /// Run the message loop until disconnect.
    pub(crate) async fn run(
        mut self,
        emit_rx: &mut mpsc::Receiver<ClientEvent>,
        events_tx: &mpsc::Sender<TransportEvent>,
        shutdown: &CancellationToken,
    ) -> SessionEnd {
        let mut last_activity = Instant::now();
        let mut health_interval = tokio::time::interval(HEALTH_CHECK_INTERVAL);
        // First tick completes immediately.
        health_interval.tick().await;

        loop {
            tokio::select! {
                biased;

                () = shutdown.cancelled() => {
                    let _ = self.writer.close().await;
                    return SessionEnd::Shutdown;
                }

                Some(event) = emit_rx.recv() => {
                    if let Err(e) = self.writer.send_event(&event).await {
                        return SessionEnd::Dropped(e.to_string());
                    }
                }

                frame = self.reader.recv() => {
                    last_activity = Instant::now();
                    match frame {
                        None => return SessionEnd::Dropped("stream ended".to_string()),
                        Some(Err(e)) => return SessionEnd::Dropped(e.to_string()),
                        Some(Ok(WsFrame::Text(text))) => {
                            let Some(event) = ServerEvent::decode(&text) else {
                                continue;
                            };
                            if events_tx.send(TransportEvent::Message(event)).await.is_err() {
                                log::debug!("Event receiver dropped, closing WebSocket");
                                let _ = self.writer.close().await;
                                return SessionEnd::Shutdown;
                            }
                        }
                        Some(Ok(WsFrame::Ping(data))) => {
                            if let Err(e) = self.writer.send_pong(data).await {
                                return SessionEnd::Dropped(e.to_string());
                            }
                        }
                        Some(Ok(WsFrame::Pong(_) | WsFrame::Binary(_))) => {}
                        Some(Ok(WsFrame::Close { code, reason })) => {
                            return SessionEnd::Dropped(format!(
                                "closed by server ({code}) {reason}"
                            ));
                        }
                    }
                }

                _ = health_interval.tick() => {
                    if last_activity.elapsed() > CONNECTION_STALE_TIMEOUT {
                        log::warn!(
                            "WebSocket stale ({}s without traffic), reconnecting",
                            last_activity.elapsed().as_secs()
                        );
                        return SessionEnd::Dropped("connection stale".to_string());
                    }
                    if let Err(e) = self.writer.send_ping().await {
                        return SessionEnd::Dropped(e.to_string());
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_to_ws_scheme_https() {
        assert_eq!(http_to_ws_scheme("https://example.com"), "wss://example.com");
    }

    #[test]
    fn test_http_to_ws_scheme_http() {
        assert_eq!(
            http_to_ws_scheme("http://localhost:3000"),
            "ws://localhost:3000"
        );
    }

    #[test]
    fn test_http_to_ws_scheme_passthrough() {
        assert_eq!(
            http_to_ws_scheme("wss://example.com/notifications"),
            "wss://example.com/notifications"
        );
        assert_eq!(
            http_to_ws_scheme("ws://localhost:3000/notifications"),
            "ws://localhost:3000/notifications"
        );
    }

    #[test]
    fn test_http_to_ws_scheme_only_touches_prefix() {
        assert_eq!(
            http_to_ws_scheme("https://example.com/?next=http://other"),
            "wss://example.com/?next=http://other"
        );
    }

    #[test]
    fn test_socket_url() {
        let endpoint = Endpoint::new("https://example.com");
        assert_eq!(socket_url(&endpoint), "wss://example.com/notifications/ws");
    }

    #[tokio::test]
    async fn test_connect_invalid_url_returns_error() {
        assert!(connect("not-a-url").await.is_err());
    }

    #[tokio::test]
    async fn test_connect_unreachable_host_returns_error() {
        let result = connect("ws://127.0.0.1:1/invalid").await;
        assert!(matches!(result, Err(TransportError::ConnectionFailed(_))));
    }
}
