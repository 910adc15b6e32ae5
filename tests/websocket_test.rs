//! WebSocket round trip against a local tokio-tungstenite server.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use notifeed::channel::TransportKind;
use notifeed::{ConnectionState, Endpoint, Identity, LifecycleController, SideEffects};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

const WAIT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn test_websocket_handshake_and_push() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

        let handshake = loop {
            match ws.next().await.unwrap().unwrap() {
                Message::Text(text) => break text,
                _ => continue,
            }
        };

        ws.send(Message::Text(
            json!({"event": "authenticated", "data": {"success": true}}).to_string(),
        ))
        .await
        .unwrap();
        ws.send(Message::Text(
            json!({"event": "typing", "data": {}}).to_string(),
        ))
        .await
        .unwrap();
        ws.send(Message::Text(
            json!({
                "event": "notification",
                "data": {
                    "id": "n1",
                    "type": "business_response",
                    "title": "The owner replied",
                    "message": "Thanks for visiting!",
                    "timestamp": 1_767_225_600_000_i64,
                    "priority": "high"
                }
            })
            .to_string(),
        ))
        .await
        .unwrap();

        // Hold the socket until the client closes it.
        while let Some(Ok(message)) = ws.next().await {
            if message.is_close() {
                break;
            }
        }
        handshake
    });

    let mut endpoint = Endpoint::new(format!("http://{addr}"));
    endpoint.transports = vec![TransportKind::Websocket];
    let controller = LifecycleController::new(endpoint, SideEffects::noop());
    let identity = Identity::new("u1", "business").with_business_ids(["b1"]);

    controller.set_identity(Some(identity)).await;

    let mut connection = controller.watch_connection();
    tokio::time::timeout(
        WAIT,
        connection.wait_for(|s| s == ConnectionState::Authenticated),
    )
    .await
    .expect("authenticated in time");

    let mut feed = controller.store().subscribe();
    let snapshot = tokio::time::timeout(WAIT, feed.wait_for(|s| s.contains("n1")))
        .await
        .expect("notification in time")
        .unwrap()
        .clone();
    let n1 = snapshot.get("n1").unwrap();
    assert_eq!(n1.kind, "business_response");
    assert_eq!(n1.timestamp.timestamp_millis(), 1_767_225_600_000);
    assert!(!n1.read);

    controller.set_identity(None).await;
    assert!(!controller.is_connected());

    let handshake = tokio::time::timeout(WAIT, server)
        .await
        .expect("server finished")
        .unwrap();
    let handshake: Value = serde_json::from_str(&handshake).unwrap();
    assert_eq!(
        handshake,
        json!({
            "event": "authenticate",
            "data": {"userId": "u1", "userRole": "business", "businessIds": ["b1"]}
        })
    );
}

#[tokio::test]
async fn test_server_close_is_reported_as_disconnect() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        // Wait for the handshake, then hang up.
        let _ = ws.next().await;
        let _ = ws.close(None).await;
    });

    let mut endpoint = Endpoint::new(format!("http://{addr}"));
    endpoint.transports = vec![TransportKind::Websocket];
    let controller = LifecycleController::new(endpoint, SideEffects::noop());
    let mut connection = controller.watch_connection();

    controller
        .set_identity(Some(Identity::new("u1", "user")))
        .await;

    tokio::time::timeout(WAIT, connection.wait_for(ConnectionState::is_connected))
        .await
        .expect("connected in time");
    tokio::time::timeout(WAIT, connection.wait_for(|s| !s.is_connected()))
        .await
        .expect("drop noticed in time");

    controller.shutdown().await;
}
