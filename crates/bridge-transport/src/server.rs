//! HTTP + WebSocket server for the bridge.
//!
//! One axum app serves both sides of the relay: browser bridge clients
//! upgrade on `/ws`, HTTP callers POST prompts on `/send`. The connection
//! task and the relay stream only meet through the registry and the
//! correlator, so a failure on either side stays on that side.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    Router,
    body::{Body, Bytes},
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    http::{StatusCode, header},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use bridge_core::{ConnectionRegistry, RequestCorrelator, StreamRelay, dispatch_frame};
use bridge_protocol::{PromptRequest, RelayError};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tower_http::cors::CorsLayer;

/// Transport server configuration.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Port to listen on (0 for OS-assigned)
    pub port: u16,
    /// Hostname to bind to
    pub hostname: String,
    /// Idle window between relay events before a request times out
    pub idle_timeout: Duration,
    /// Maximum concurrent bridge client connections
    pub max_connections: Option<usize>,
    /// Allow cross-origin calls to the HTTP intake (the extension popup
    /// fetches `/send` from its own origin)
    pub enable_cors: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            port: 8765,
            hostname: "0.0.0.0".into(),
            idle_timeout: bridge_core::relay::DEFAULT_IDLE_TIMEOUT,
            max_connections: Some(32),
            enable_cors: true,
        }
    }
}

/// Shared state for the transport server.
struct AppState {
    registry: Arc<ConnectionRegistry>,
    correlator: Arc<RequestCorrelator>,
    relay: StreamRelay,
    config: TransportConfig,
    started_at: Instant,
}

/// The transport server — owns the listener task and its shutdown signal.
pub struct TransportServer {
    shutdown_tx: Option<mpsc::Sender<()>>,
    handle: Option<tokio::task::JoinHandle<()>>,
    port: u16,
}

impl TransportServer {
    /// Bind and start serving. The registry and correlator are created by
    /// the caller so tests and the binary wire them the same way.
    pub async fn start(
        config: TransportConfig,
        registry: Arc<ConnectionRegistry>,
        correlator: Arc<RequestCorrelator>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);

        let relay = StreamRelay::new(registry.clone(), correlator.clone(), config.idle_timeout);
        let enable_cors = config.enable_cors;
        let state = Arc::new(AppState {
            registry,
            correlator,
            relay,
            config: config.clone(),
            started_at: Instant::now(),
        });

        let mut app = Router::new()
            .route("/ws", get(ws_upgrade_handler))
            .route("/send", post(send_handler))
            .route("/health", get(health_handler))
            .with_state(state);

        if enable_cors {
            app = app.layer(CorsLayer::permissive());
        }

        let addr: SocketAddr = format!("{}:{}", config.hostname, config.port).parse()?;
        let listener = tokio::net::TcpListener::bind(addr).await?;
        let actual_port = listener.local_addr()?.port();

        info!(
            "Bridge listening on http://{}:{} (ws endpoint: /ws)",
            config.hostname, actual_port
        );

        let handle = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.recv().await;
                })
                .await
                .ok();
        });

        Ok(Self {
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
            port: actual_port,
        })
    }

    /// Get the actual bound port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Gracefully stop the server.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(()).await;
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
        info!("Bridge transport stopped");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// HTTP Handlers
// ─────────────────────────────────────────────────────────────────────────────

async fn ws_upgrade_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    if let Some(max) = state.config.max_connections {
        if state.registry.client_count() >= max {
            warn!("Connection rejected: max connections reached ({max})");
            return StatusCode::SERVICE_UNAVAILABLE.into_response();
        }
    }

    ws.on_upgrade(move |socket| handle_ws_connection(socket, state))
        .into_response()
}

async fn send_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PromptRequest>,
) -> Response {
    match state
        .relay
        .handle(&request.model, &request.prompt, request.new_chat)
    {
        Ok(records) => {
            let body = Body::from_stream(
                records.map(|record| Ok::<_, Infallible>(Bytes::from(record.to_line()))),
            );
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "application/x-ndjson")],
                body,
            )
                .into_response()
        }
        Err(RelayError::NoClientsConnected) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"detail": "No bridge client connected"})),
        )
            .into_response(),
    }
}

async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "clients": state.registry.client_count(),
        "pendingRequests": state.correlator.pending_count(),
        "uptimeSecs": state.started_at.elapsed().as_secs(),
    }))
}

// ─────────────────────────────────────────────────────────────────────────────
// WebSocket Connection Handler
// ─────────────────────────────────────────────────────────────────────────────

async fn handle_ws_connection(socket: WebSocket, state: Arc<AppState>) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    // Register first so a prompt arriving right after the upgrade already
    // sees this client as a broadcast target.
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();
    let client_id = state.registry.register(outbound_tx);
    info!(
        "Bridge client connected: {client_id} (total: {})",
        state.registry.client_count()
    );

    loop {
        tokio::select! {
            // Broadcast frames queued for this client
            frame = outbound_rx.recv() => {
                match frame {
                    Some(text) => {
                        if let Err(e) = ws_tx.send(Message::Text(text.into())).await {
                            warn!("Failed to send to {client_id}: {e}");
                            break;
                        }
                    }
                    // Sender side dropped — the registry pruned this client
                    None => break,
                }
            }

            // Incoming frames from the client
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        dispatch_frame(&state.correlator, &text);
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = ws_tx.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("Bridge client closed: {client_id}");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!("WebSocket error for {client_id}: {e}");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    state.registry.unregister(&client_id);
    info!(
        "Bridge client disconnected: {client_id} (remaining: {})",
        state.registry.client_count()
    );
}
