//! WebSocket and HTTP transport
//!
//! Maps URL paths onto broadcaster channels:
//!
//! - `GET /ws` joins channel `/`, `GET /ws/{name}` joins channel `/{name}`
//! - `GET /api/health` answers `{"status":"ok"}` regardless of device state
//! - `GET /api/gpu` returns the latest snapshot without touching the device
//!
//! Every snapshot is sent as a text frame `{"event":"gpu_metrics","data":{..}}`.

use crate::domain::MetricsSnapshot;
use crate::services::{Broadcaster, Subscription};

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::Serialize;
use tokio::net::TcpListener;

/// Event name every snapshot frame carries
pub const EVENT_NAME: &str = "gpu_metrics";

/// Shared transport state
#[derive(Clone)]
pub struct AppState {
    broadcaster: Arc<Broadcaster>,
    channels: Arc<Vec<String>>,
}

impl AppState {
    /// Create transport state serving the given channels
    pub fn new(broadcaster: Arc<Broadcaster>, channels: Vec<String>) -> Self {
        Self {
            broadcaster,
            channels: Arc::new(channels),
        }
    }

    fn serves(&self, channel: &str) -> bool {
        self.channels.iter().any(|c| c == channel)
    }

    /// Channel read by the one-shot snapshot endpoint: `/` when served,
    /// otherwise the first configured channel
    fn primary_channel(&self) -> &str {
        if self.serves("/") {
            "/"
        } else {
            self.channels.first().map(String::as_str).unwrap_or("/")
        }
    }
}

#[derive(Serialize)]
struct EventFrame<'a> {
    event: &'static str,
    data: &'a MetricsSnapshot,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

/// Serialize a snapshot as a `gpu_metrics` event frame
pub fn encode_event(snapshot: &MetricsSnapshot) -> Result<String, serde_json::Error> {
    serde_json::to_string(&EventFrame {
        event: EVENT_NAME,
        data: snapshot,
    })
}

/// Build the router for all transport routes
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(handle_health))
        .route("/api/gpu", get(handle_latest))
        .route("/ws", get(handle_ws_root))
        .route("/ws/{channel}", get(handle_ws_channel))
        .with_state(state)
}

/// Bind the listening socket
pub async fn bind(addr: SocketAddr) -> std::io::Result<TcpListener> {
    TcpListener::bind(addr).await
}

/// Serve until `shutdown` resolves
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    log::info!(
        "Serving on ws://{}/ws (channels: {})",
        addr,
        state.channels.join(", ")
    );

    let broadcaster = Arc::clone(&state.broadcaster);
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async move {
            shutdown.await;
            // Upgraded sockets are not tracked by graceful shutdown; end them here
            broadcaster.close();
        })
        .await
}

/// Resolve on Ctrl-C or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                log::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("Shutdown signal received");
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

async fn handle_latest(State(state): State<AppState>) -> (StatusCode, Json<MetricsSnapshot>) {
    let snapshot = state
        .broadcaster
        .latest(state.primary_channel())
        .map(|s| (*s).clone())
        .unwrap_or_else(MetricsSnapshot::not_initialized);

    let status = if snapshot.is_ok() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(snapshot))
}

async fn handle_ws_root(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    upgrade(ws, state, "/".to_string())
}

async fn handle_ws_channel(
    ws: WebSocketUpgrade,
    Path(channel): Path<String>,
    State(state): State<AppState>,
) -> Response {
    upgrade(ws, state, format!("/{}", channel))
}

fn upgrade(ws: WebSocketUpgrade, state: AppState, channel: String) -> Response {
    if !state.serves(&channel) {
        return (StatusCode::NOT_FOUND, format!("unknown channel {}", channel)).into_response();
    }

    ws.on_upgrade(move |socket| async move {
        let subscription = state.broadcaster.join(&channel);
        session(socket, subscription, &state.broadcaster).await;
    })
}

async fn session(mut socket: WebSocket, mut subscription: Subscription, broadcaster: &Broadcaster) {
    loop {
        tokio::select! {
            next = subscription.recv() => {
                // None: the broadcaster is shutting down
                let Some(snapshot) = next else { break };
                let frame = match encode_event(&snapshot) {
                    Ok(frame) => frame,
                    Err(e) => {
                        log::error!("Failed to encode snapshot: {}", e);
                        continue;
                    }
                };
                if socket.send(Message::Text(frame.into())).await.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    // Client frames carry no meaning; pings are answered by axum
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    broadcaster.leave(subscription.channel(), subscription.id());
    let _ = socket.send(Message::Close(None)).await;
}
