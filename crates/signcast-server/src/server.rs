use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use futures::StreamExt;
use signcast_telemetry::MetricsRecorder;
use signcast_vision::{DetectorHandle, FrameCodec};
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::dispatch::{Broadcaster, DeliveryMode};
use crate::pipeline::FramePipeline;
use crate::registry::{self, Connection, ConnectionRegistry};
use crate::session::{self, SessionShared};

/// Server configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Outbound messages buffered per client before new ones are dropped for it.
    pub max_send_queue: usize,
    /// Largest inbound message accepted, in bytes.
    pub max_message_bytes: usize,
    pub heartbeat_interval: Duration,
    /// Connections silent for longer than this are closed by the sweeper.
    pub client_timeout: Duration,
    pub cleanup_interval: Duration,
    pub delivery_mode: DeliveryMode,
    /// Draw detections onto the returned frame.
    pub annotate: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8765,
            max_send_queue: 64,
            max_message_bytes: 16 * 1024 * 1024,
            heartbeat_interval: Duration::from_secs(30),
            client_timeout: Duration::from_secs(90),
            cleanup_interval: Duration::from_secs(60),
            delivery_mode: DeliveryMode::Broadcast,
            annotate: true,
        }
    }
}

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub session: SessionShared,
    pub detector: DetectorHandle,
    pub max_send_queue: usize,
    pub max_message_bytes: usize,
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        config: &ServerConfig,
        detector: DetectorHandle,
        codec: FrameCodec,
        metrics: Arc<MetricsRecorder>,
        shutdown: CancellationToken,
    ) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let broadcaster = Arc::new(Broadcaster::new(Arc::clone(&registry), Arc::clone(&metrics)));
        let pipeline = Arc::new(FramePipeline::new(
            codec,
            detector.clone(),
            config.annotate,
            Arc::clone(&metrics),
        ));
        Self {
            session: SessionShared {
                registry,
                broadcaster,
                pipeline,
                metrics,
                delivery_mode: config.delivery_mode,
                heartbeat_interval: config.heartbeat_interval,
            },
            detector,
            max_send_queue: config.max_send_queue,
            max_message_bytes: config.max_message_bytes,
            shutdown,
        }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.session.registry
    }
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Bind the listener and start serving. Returns a handle to shut it down.
pub async fn start(
    config: ServerConfig,
    detector: DetectorHandle,
    codec: FrameCodec,
    metrics: Arc<MetricsRecorder>,
) -> Result<ServerHandle, std::io::Error> {
    let shutdown = CancellationToken::new();
    let state = AppState::new(&config, detector, codec, metrics, shutdown.clone());
    let registry = Arc::clone(state.registry());

    let cleanup = registry::start_cleanup_task(
        Arc::clone(&registry),
        config.cleanup_interval,
        config.client_timeout,
        shutdown.clone(),
    );

    let router = build_router(state);
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    tracing::info!(
        addr = %local_addr,
        delivery_mode = ?config.delivery_mode,
        "Signcast server started"
    );

    let server_shutdown = shutdown.clone();
    let server = tokio::spawn(async move {
        let serve = axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move { server_shutdown.cancelled().await });
        if let Err(e) = serve.await {
            tracing::error!(error = %e, "Server error");
        }
    });

    Ok(ServerHandle {
        local_addr,
        shutdown,
        registry,
        server,
        _cleanup: cleanup,
    })
}

/// Handle returned by `start()`; keeps background tasks alive.
pub struct ServerHandle {
    local_addr: SocketAddr,
    shutdown: CancellationToken,
    registry: Arc<ConnectionRegistry>,
    server: tokio::task::JoinHandle<()>,
    _cleanup: tokio::task::JoinHandle<()>,
}

impl ServerHandle {
    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn connection_count(&self) -> usize {
        self.registry.len()
    }

    /// Stop accepting connections, close every session and wait for the server task.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        let closed = self.registry.close_all();
        tracing::info!(closed, "Shutting down");
        if self.server.await.is_err() {
            tracing::warn!("Server task panicked during shutdown");
        }
    }
}

/// WebSocket upgrade handler.
async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.max_message_size(state.max_message_bytes)
        .on_upgrade(move |socket| handle_socket(socket, remote, state))
}

async fn handle_socket(socket: WebSocket, remote: SocketAddr, state: AppState) {
    let (conn, rx) = Connection::open(
        state.max_send_queue,
        state.shutdown.child_token(),
        Some(remote),
    );
    let (sink, stream) = socket.split();
    session::run_session(conn, rx, sink, stream, state.session).await;
}

/// Health check HTTP endpoint.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let model_loaded = state.detector.is_ready();
    let (http_status, status) = if model_loaded {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    let body = serde_json::json!({
        "status": status,
        "model_loaded": model_loaded,
        "backend": state.detector.backend_name(),
        "connections": state.registry().len(),
        "frames_processed": state.detector.frames_processed(),
        "metrics": metrics_summary(&state.session.metrics),
    });
    (http_status, Json(body))
}

/// Counters and latency percentiles recorded since startup.
fn metrics_summary(metrics: &MetricsRecorder) -> serde_json::Value {
    let failed: serde_json::Map<String, serde_json::Value> = metrics
        .snapshot()
        .into_iter()
        .filter(|m| m.name == "frames.failed")
        .filter_map(|m| {
            let kind = m.labels.get("kind")?.clone();
            Some((kind, serde_json::Value::from(m.value as u64)))
        })
        .collect();

    let latency = |name: &str| {
        let summary = metrics.histogram_summary(name, &[]);
        serde_json::json!({
            "count": summary.count,
            "p50": summary.p50,
            "p95": summary.p95,
            "p99": summary.p99,
        })
    };

    serde_json::json!({
        "frames": {
            "received": metrics.counter_get("frames.received", &[]),
            "decoded": metrics.counter_get("frames.decoded", &[]),
            "broadcast": metrics.counter_get("frames.broadcast", &[]),
            "failed": failed,
        },
        "delivery": {
            "delivered": metrics.counter_get("broadcast.delivered", &[]),
            "dropped": metrics.counter_get("broadcast.dropped", &[]),
            "evicted": metrics.counter_get("broadcast.evicted", &[]),
            "replies": metrics.counter_get("replies.delivered", &[]),
        },
        "protocol_errors": metrics.counter_total("protocol.errors"),
        "connections_total": metrics.counter_get("ws.connections.total", &[]),
        "pipeline_ms": latency("pipeline.duration_ms"),
        "detector_ms": latency("detector.duration_ms"),
    })
}
