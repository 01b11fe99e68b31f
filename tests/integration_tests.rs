//! End-to-end integration tests — a WebSocket bridge client and a streaming
//! HTTP caller exercising a running server.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use bridge_core::{ConnectionRegistry, RequestCorrelator};
use bridge_transport::{TransportConfig, TransportServer};

type WsClient =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Start a test server on a random port.
async fn start_test_server(idle_timeout: Duration) -> u16 {
    let registry = Arc::new(ConnectionRegistry::new());
    let correlator = Arc::new(RequestCorrelator::new());

    let config = TransportConfig {
        port: 0, // OS-assigned
        hostname: "127.0.0.1".into(),
        idle_timeout,
        max_connections: Some(16),
        enable_cors: false,
    };

    let transport = TransportServer::start(config, registry, correlator)
        .await
        .unwrap();
    let port = transport.port();

    // Leak the transport to keep it running for the test
    Box::leak(Box::new(transport));

    port
}

async fn connect_client(port: u16) -> WsClient {
    let url = format!("ws://127.0.0.1:{port}/ws");
    let (ws, _) = connect_async(&url).await.expect("Failed to connect");
    ws
}

/// Poll `/health` until the expected number of clients is registered.
/// Registration happens inside the upgrade task, so a POST fired straight
/// after `connect_async` could otherwise race it.
async fn wait_for_clients(port: u16, expected: u64) {
    for _ in 0..50 {
        let health: Value = reqwest::get(format!("http://127.0.0.1:{port}/health"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        if health["clients"] == json!(expected) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("Timed out waiting for {expected} registered clients");
}

/// Read the next broadcast command frame from the client's socket.
async fn next_command(ws: &mut WsClient) -> Value {
    let msg = timeout(Duration::from_secs(5), ws.next())
        .await
        .expect("Timeout waiting for broadcast")
        .expect("Stream ended")
        .expect("WebSocket error");
    serde_json::from_str(msg.to_text().unwrap()).unwrap()
}

async fn send_frame(ws: &mut WsClient, frame: Value) {
    ws.send(Message::Text(frame.to_string().into()))
        .await
        .unwrap();
}

fn parse_ndjson(body: &str) -> Vec<Value> {
    body.lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn send_without_any_client_returns_503() {
    let port = start_test_server(Duration::from_secs(5)).await;

    let response = reqwest::Client::new()
        .post(format!("http://127.0.0.1:{port}/send"))
        .json(&json!({"model": "gemini", "prompt": "hi"}))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 503);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["detail"], "No bridge client connected");
}

#[tokio::test]
async fn health_reports_connected_clients() {
    let port = start_test_server(Duration::from_secs(5)).await;

    let health: Value = reqwest::get(format!("http://127.0.0.1:{port}/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["clients"], json!(0));

    let _client = connect_client(port).await;
    wait_for_clients(port, 1).await;
}

#[tokio::test]
async fn full_prompt_roundtrip_streams_ndjson() {
    let port = start_test_server(Duration::from_secs(5)).await;
    let mut client = connect_client(port).await;
    wait_for_clients(port, 1).await;

    let request = tokio::spawn(async move {
        reqwest::Client::new()
            .post(format!("http://127.0.0.1:{port}/send"))
            .json(&json!({"model": "gemini", "prompt": "say hello", "new_chat": true}))
            .send()
            .await
            .unwrap()
    });

    // The client receives the broadcast command verbatim.
    let command = next_command(&mut client).await;
    assert_eq!(command["action"], "sendPrompt");
    assert_eq!(command["model"], "gemini");
    assert_eq!(command["text"], "say hello");
    assert_eq!(command["newChat"], true);
    let id = command["requestId"].as_str().unwrap().to_string();

    // Reply as the extension would: status, stream chunks, final response.
    send_frame(
        &mut client,
        json!({"type": "status", "requestId": id, "status": "Typing prompt"}),
    )
    .await;
    send_frame(
        &mut client,
        json!({"type": "stream", "requestId": id, "chunk": "Hel"}),
    )
    .await;
    send_frame(
        &mut client,
        json!({"type": "stream", "requestId": id, "chunk": "lo"}),
    )
    .await;
    send_frame(
        &mut client,
        json!({"type": "response", "requestId": id, "text": "Hello"}),
    )
    .await;

    let response = request.await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers()["content-type"],
        "application/x-ndjson"
    );

    let body = response.text().await.unwrap();
    assert_eq!(
        parse_ndjson(&body),
        vec![
            json!({"type": "status", "text": "Request queued"}),
            json!({"type": "status", "text": "Typing prompt"}),
            json!({"type": "chunk", "text": "Hel"}),
            json!({"type": "chunk", "text": "lo"}),
            json!({"type": "done", "text": "Hello"}),
        ]
    );
}

#[tokio::test]
async fn silent_client_produces_timeout_error_line() {
    let port = start_test_server(Duration::from_millis(300)).await;
    let mut client = connect_client(port).await;
    wait_for_clients(port, 1).await;

    let request = tokio::spawn(async move {
        reqwest::Client::new()
            .post(format!("http://127.0.0.1:{port}/send"))
            .json(&json!({"model": "gemini", "prompt": "hi"}))
            .send()
            .await
            .unwrap()
    });

    // Receive the command but never answer it.
    let command = next_command(&mut client).await;
    assert_eq!(command["action"], "sendPrompt");

    let body = request.await.unwrap().text().await.unwrap();
    assert_eq!(
        parse_ndjson(&body),
        vec![
            json!({"type": "status", "text": "Request queued"}),
            json!({"type": "error", "text": "Timeout waiting for AI response"}),
        ]
    );
}

#[tokio::test]
async fn broadcast_reaches_every_connected_client() {
    let port = start_test_server(Duration::from_secs(5)).await;
    let mut client_a = connect_client(port).await;
    let mut client_b = connect_client(port).await;
    wait_for_clients(port, 2).await;

    let request = tokio::spawn(async move {
        reqwest::Client::new()
            .post(format!("http://127.0.0.1:{port}/send"))
            .json(&json!({"model": "gemini", "prompt": "hi"}))
            .send()
            .await
            .unwrap()
    });

    let command_a = next_command(&mut client_a).await;
    let command_b = next_command(&mut client_b).await;
    assert_eq!(command_a, command_b);
    let id = command_a["requestId"].as_str().unwrap().to_string();

    // Only one client answers; a frame for an unknown id is ignored.
    send_frame(
        &mut client_b,
        json!({"type": "response", "requestId": "not-a-real-id", "text": "noise"}),
    )
    .await;
    send_frame(
        &mut client_a,
        json!({"type": "response", "requestId": id, "text": "hello"}),
    )
    .await;

    let body = request.await.unwrap().text().await.unwrap();
    assert_eq!(
        parse_ndjson(&body),
        vec![
            json!({"type": "status", "text": "Request queued"}),
            json!({"type": "done", "text": "hello"}),
        ]
    );
}

#[tokio::test]
async fn malformed_frames_do_not_break_the_connection() {
    let port = start_test_server(Duration::from_secs(5)).await;
    let mut client = connect_client(port).await;
    wait_for_clients(port, 1).await;

    // Garbage, a keepalive, and an unknown type — the read loop must shrug
    // all of these off.
    client
        .send(Message::Text("not json at all".into()))
        .await
        .unwrap();
    send_frame(&mut client, json!({"type": "ping"})).await;
    send_frame(&mut client, json!({"type": "mystery", "requestId": "x"})).await;

    let request = tokio::spawn(async move {
        reqwest::Client::new()
            .post(format!("http://127.0.0.1:{port}/send"))
            .json(&json!({"model": "gemini", "prompt": "still alive?"}))
            .send()
            .await
            .unwrap()
    });

    let command = next_command(&mut client).await;
    let id = command["requestId"].as_str().unwrap().to_string();
    send_frame(
        &mut client,
        json!({"type": "response", "requestId": id, "text": "yes"}),
    )
    .await;

    let body = request.await.unwrap().text().await.unwrap();
    assert_eq!(
        parse_ndjson(&body),
        vec![
            json!({"type": "status", "text": "Request queued"}),
            json!({"type": "done", "text": "yes"}),
        ]
    );
}

#[tokio::test]
async fn client_disconnect_frees_a_broadcast_slot() {
    let port = start_test_server(Duration::from_secs(5)).await;

    let client = connect_client(port).await;
    wait_for_clients(port, 1).await;
    drop(client);
    wait_for_clients(port, 0).await;

    // With the only client gone, intake fails fast again.
    let response = reqwest::Client::new()
        .post(format!("http://127.0.0.1:{port}/send"))
        .json(&json!({"model": "gemini", "prompt": "hi"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 503);
}
