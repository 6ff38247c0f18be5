//! Per-connection session: registration, the writer task and the read loop.

use std::fmt::Display;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::Message as WsMessage;
use futures::{Sink, SinkExt, Stream, StreamExt};
use signcast_core::{FrameId, InboundMessage, OutboundMessage, ProtocolError};
use signcast_telemetry::MetricsRecorder;
use tokio::sync::mpsc;
use tracing::{debug, error, info, info_span, trace, warn, Instrument};

use crate::dispatch::{Broadcaster, DeliveryMode};
use crate::pipeline::{FrameError, FramePipeline};
use crate::registry::{Connection, ConnectionRegistry};

/// Everything a session needs from the server, cheap to clone per connection.
#[derive(Clone)]
pub struct SessionShared {
    pub registry: Arc<ConnectionRegistry>,
    pub broadcaster: Arc<Broadcaster>,
    pub pipeline: Arc<FramePipeline>,
    pub metrics: Arc<MetricsRecorder>,
    pub delivery_mode: DeliveryMode,
    pub heartbeat_interval: Duration,
}

/// Drive one connection until the client leaves or the connection is closed.
///
/// The connection is registered on entry and unregistered on every exit path. Frames are
/// processed in arrival order; a frame that is already in flight when the connection
/// starts closing still completes.
pub async fn run_session<W, R, E>(
    conn: Arc<Connection>,
    outbound: mpsc::Receiver<String>,
    sink: W,
    stream: R,
    shared: SessionShared,
) where
    W: Sink<WsMessage> + Unpin + Send + 'static,
    W::Error: Send,
    R: Stream<Item = Result<WsMessage, E>> + Unpin,
    E: Display,
{
    let span = info_span!("session", connection_id = %conn.id());
    async move {
        if !shared.registry.register(Arc::clone(&conn)) {
            warn!("Connection id already registered, refusing session");
            return;
        }
        shared.metrics.counter_inc("ws.connections.total", &[], 1);
        update_active(&shared);
        info!(remote = ?conn.remote(), connections = shared.registry.len(), "Client connected");

        let writer = tokio::spawn(
            write_loop(Arc::clone(&conn), outbound, sink, shared.heartbeat_interval)
                .in_current_span(),
        );

        read_loop(&conn, stream, &shared).await;

        conn.begin_close();
        shared.registry.unregister(conn.id());
        update_active(&shared);
        if writer.await.is_err() {
            warn!("Writer task panicked");
        }
        info!(connections = shared.registry.len(), "Client disconnected");
    }
    .instrument(span)
    .await
}

fn update_active(shared: &SessionShared) {
    shared
        .metrics
        .gauge_set("ws.connections.active", &[], shared.registry.len() as i64);
}

/// Forward queued messages to the socket and send transport pings.
async fn write_loop<W>(
    conn: Arc<Connection>,
    mut outbound: mpsc::Receiver<String>,
    mut sink: W,
    heartbeat: Duration,
) where
    W: Sink<WsMessage> + Unpin + Send,
    W::Error: Send,
{
    let mut ping_interval = tokio::time::interval(heartbeat);
    ping_interval.tick().await;

    loop {
        tokio::select! {
            _ = conn.closed() => break,
            msg = outbound.recv() => {
                match msg {
                    Some(text) => {
                        if sink.send(WsMessage::Text(text.into())).await.is_err() {
                            debug!("Socket write failed");
                            break;
                        }
                    }
                    None => break,
                }
            }
            _ = ping_interval.tick() => {
                if sink.send(WsMessage::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
                trace!("Sent ping");
            }
        }
    }

    // a dead writer means the reader should stop too
    conn.begin_close();
    let _ = sink.send(WsMessage::Close(None)).await;
    let _ = sink.close().await;
}

async fn read_loop<R, E>(conn: &Arc<Connection>, mut stream: R, shared: &SessionShared)
where
    R: Stream<Item = Result<WsMessage, E>> + Unpin,
    E: Display,
{
    loop {
        let next = tokio::select! {
            _ = conn.closed() => {
                debug!("Session closed by server");
                break;
            }
            next = stream.next() => next,
        };

        let msg = match next {
            Some(Ok(msg)) => msg,
            Some(Err(e)) => {
                debug!(error = %e, "Socket read failed");
                break;
            }
            None => break,
        };
        conn.record_seen();

        match msg {
            WsMessage::Text(text) => handle_text(conn, text.as_str(), shared).await,
            WsMessage::Binary(_) => protocol_error(shared, ProtocolError::Binary),
            WsMessage::Close(_) => break,
            WsMessage::Ping(_) | WsMessage::Pong(_) => {}
        }
    }
}

async fn handle_text(conn: &Arc<Connection>, raw: &str, shared: &SessionShared) {
    match InboundMessage::parse(raw) {
        Ok(InboundMessage::Ping) => {
            if let Err(e) = shared.broadcaster.send_to(conn, &OutboundMessage::Pong) {
                debug!(error = %e, "Pong not delivered");
            }
        }
        Ok(InboundMessage::CameraFrame { image, confidence }) => {
            process_frame(conn, image, confidence, shared).await;
        }
        Err(e) => protocol_error(shared, e),
    }
}

fn protocol_error(shared: &SessionShared, e: ProtocolError) {
    shared
        .metrics
        .counter_inc("protocol.errors", &[("kind", e.error_kind())], 1);
    match e {
        ProtocolError::Binary => debug!("Ignoring binary message"),
        ProtocolError::Malformed(_) => warn!(error = %e, "Ignoring malformed message"),
    }
}

async fn process_frame(conn: &Arc<Connection>, image: String, threshold: f32, shared: &SessionShared) {
    let frame_id = FrameId::new();
    let span = info_span!("frame", frame_id = %frame_id);
    async move {
        let started = Instant::now();
        shared.metrics.counter_inc("frames.received", &[], 1);

        let analyzed = match shared.pipeline.analyze(image, threshold).await {
            Ok(frame) => frame,
            Err(e) => return frame_failed(shared, &e),
        };

        if !has_recipients(conn, shared) {
            debug!("No recipients, skipping render");
            return;
        }

        let result = match shared.pipeline.render(analyzed).await {
            Ok(result) => result,
            Err(e) => return frame_failed(shared, &e),
        };

        let message = result.to_message();
        let report = match shared.delivery_mode {
            DeliveryMode::Broadcast => shared.broadcaster.broadcast(&message),
            DeliveryMode::Unicast => shared.broadcaster.deliver(&message, std::slice::from_ref(conn)),
        };

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        if report.delivered > 0 {
            shared.metrics.counter_inc("frames.broadcast", &[], 1);
        }
        shared
            .metrics
            .histogram_observe("pipeline.duration_ms", &[], elapsed_ms);
        debug!(
            detections = result.detections.len(),
            delivered = report.delivered,
            dropped = report.dropped.len(),
            evicted = report.evicted.len(),
            elapsed_ms,
            "Frame delivered"
        );
    }
    .instrument(span)
    .await
}

fn has_recipients(conn: &Connection, shared: &SessionShared) -> bool {
    match shared.delivery_mode {
        DeliveryMode::Broadcast => !shared.registry.is_empty(),
        DeliveryMode::Unicast => shared.registry.contains(conn.id()),
    }
}

fn frame_failed(shared: &SessionShared, e: &FrameError) {
    let kind = e.error_kind();
    shared
        .metrics
        .counter_inc("frames.failed", &[("kind", kind)], 1);
    match e {
        FrameError::Decode(_) => warn!(error = %e, "Dropping undecodable frame"),
        FrameError::Detection(signcast_core::DetectionError::Timeout(_)) => {
            error!(error = %e, "Detection timed out")
        }
        FrameError::Detection(_) => warn!(error = %e, "Detection failed"),
        FrameError::Encode(_) => warn!(error = %e, "Failed to encode annotated frame"),
        FrameError::Task(_) => error!(error = %e, "Frame task aborted"),
    }
}
