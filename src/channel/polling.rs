//! HTTP long-polling fallback transport.
//!
//! Used when a WebSocket upgrade is blocked by an intermediary.
//!
//! # Protocol
//!
//! ```text
//! POST <server><path>/poll/open          → {"sid": "..."}
//! GET  <server><path>/poll?sid=<sid>     → [frame, frame, ...]   (may be held open)
//! POST <server><path>/poll?sid=<sid>     ← frame                  (client event)
//! ```
//!
//! Frames use the same `{"event", "data"}` JSON shape as WebSocket text
//! frames. Any non-success status ends the session and the owning transport
//! reconnects through its normal backoff.

use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{Endpoint, SessionEnd, TransportError, TransportEvent};
use crate::protocol::{ClientEvent, ServerEvent};

/// Response to the session-open request.
#[derive(Debug, Deserialize)]
struct OpenResponse {
    sid: String,
}

/// One long-polling session.
#[derive(Debug)]
pub struct PollSession {
    client: reqwest::Client,
    url: String,
    sid: String,
    interval: Duration,
}

impl PollSession {
    /// Open a polling session.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::ConnectionFailed` if the server is unreachable
    /// or refuses the session.
    pub async fn open(
        client: &reqwest::Client,
        endpoint: &Endpoint,
    ) -> Result<Self, TransportError> {
        let open_url = endpoint.url("/poll/open");
        log::debug!("Opening polling session: {}", open_url);

        let response = client
            .post(&open_url)
            .send()
            .await
            .map_err(|e| TransportError::ConnectionFailed(format!("poll open failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::ConnectionFailed(format!(
                "poll open rejected: {status}"
            )));
        }

        let body: OpenResponse = response
            .json()
            .await
            .map_err(|e| TransportError::Protocol(format!("invalid poll open response: {e}")))?;

        Ok(Self {
            client: client.clone(),
            url: endpoint.url("/poll"),
            sid: body.sid,
            interval: endpoint.poll_interval,
        })
    }

    /// Session id assigned by the server.
    pub fn sid(&self) -> &str {
        &self.sid
    }

    /// Fetch the next batch of server events.
    ///
    /// # Errors
    ///
    /// Returns an error on network failure or non-success status.
    pub async fn poll(&self) -> Result<Vec<ServerEvent>, TransportError> {
        let response = self
            .client
            .get(&self.url)
            .query(&[("sid", self.sid.as_str())])
            .send()
            .await
            .map_err(|e| TransportError::ConnectionFailed(format!("poll failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::ConnectionFailed(format!(
                "poll rejected: {status}"
            )));
        }

        let frames: Vec<Value> = response
            .json()
            .await
            .map_err(|e| TransportError::Protocol(format!("invalid poll batch: {e}")))?;

        Ok(frames.into_iter().filter_map(ServerEvent::from_value).collect())
    }

    /// Send one client event.
    ///
    /// # Errors
    ///
    /// Returns an error on network failure or non-success status.
    pub async fn send(&self, event: &ClientEvent) -> Result<(), TransportError> {
        let response = self
            .client
            .post(&self.url)
            .query(&[("sid", self.sid.as_str())])
            .json(event)
            .send()
            .await
            .map_err(|e| TransportError::SendFailed(format!("poll send failed: {e}")))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(TransportError::SendFailed(format!(
                "poll send rejected: {status}"
            )))
        }
    }

    /// Run until the session fails or shutdown is requested.
    ///
    /// Sending and polling run concurrently so a held poll request never
    /// delays outbound events such as the handshake.
    pub(crate) async fn run(
        self,
        emit_rx: &mut mpsc::Receiver<ClientEvent>,
        events_tx: &mpsc::Sender<TransportEvent>,
        shutdown: &CancellationToken,
    ) -> SessionEnd {
        let send_loop = async {
            while let Some(event) = emit_rx.recv().await {
                if let Err(e) = self.send(&event).await {
                    return SessionEnd::Dropped(e.to_string());
                }
            }
            // All emit handles gone; keep receiving.
            std::future::pending::<SessionEnd>().await
        };

        let recv_loop = async {
            loop {
                let batch = match self.poll().await {
                    Ok(batch) => batch,
                    Err(e) => return SessionEnd::Dropped(e.to_string()),
                };
                if batch.is_empty() {
                    tokio::time::sleep(self.interval).await;
                    continue;
                }
                for event in batch {
                    if events_tx.send(TransportEvent::Message(event)).await.is_err() {
                        log::debug!("Event receiver dropped, closing polling session");
                        return SessionEnd::Shutdown;
                    }
                }
            }
        };

        tokio::select! {
            biased;
            () = shutdown.cancelled() => SessionEnd::Shutdown,
            end = send_loop => end,
            end = recv_loop => end,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_open_reads_sid() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/notifications/poll/open"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"sid": "s1"})))
            .mount(&server)
            .await;

        let endpoint = Endpoint::new(server.uri());
        let session = PollSession::open(&reqwest::Client::new(), &endpoint)
            .await
            .unwrap();
        assert_eq!(session.sid(), "s1");
    }

    #[tokio::test]
    async fn test_open_rejected_status_is_connection_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/notifications/poll/open"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let endpoint = Endpoint::new(server.uri());
        let result = PollSession::open(&reqwest::Client::new(), &endpoint).await;
        assert!(matches!(result, Err(TransportError::ConnectionFailed(_))));
    }

    #[tokio::test]
    async fn test_poll_skips_unrecognized_frames() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/notifications/poll/open"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"sid": "s1"})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/notifications/poll"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"event": "typing", "data": {}},
                {"event": "authenticated", "data": {"success": true}}
            ])))
            .mount(&server)
            .await;

        let endpoint = Endpoint::new(server.uri());
        let session = PollSession::open(&reqwest::Client::new(), &endpoint)
            .await
            .unwrap();
        let batch = session.poll().await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].name(), "authenticated");
    }
}
