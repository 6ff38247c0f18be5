//! Fan-out of outbound messages to connected clients.
//!
//! Delivery never waits on a recipient: each message is serialized once and pushed onto
//! every recipient's bounded queue with `try_send`. A saturated queue loses that one
//! message; a closed queue gets its connection evicted from the registry.

use std::str::FromStr;
use std::sync::Arc;

use signcast_core::{ConnectionId, DeliveryError, OutboundMessage};
use signcast_telemetry::MetricsRecorder;
use tracing::{debug, info, warn};

use crate::registry::{Connection, ConnectionRegistry};

/// Who receives a detection result.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DeliveryMode {
    /// Every connected client sees every result.
    #[default]
    Broadcast,
    /// Only the client that sent the frame sees its result.
    Unicast,
}

impl FromStr for DeliveryMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "broadcast" => Ok(Self::Broadcast),
            "unicast" => Ok(Self::Unicast),
            other => Err(format!("unknown delivery mode: {other}")),
        }
    }
}

/// Outcome of one fan-out.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub dropped: Vec<ConnectionId>,
    pub evicted: Vec<ConnectionId>,
}

pub struct Broadcaster {
    registry: Arc<ConnectionRegistry>,
    metrics: Arc<MetricsRecorder>,
}

impl Broadcaster {
    pub fn new(registry: Arc<ConnectionRegistry>, metrics: Arc<MetricsRecorder>) -> Self {
        Self { registry, metrics }
    }

    /// Send to everyone registered right now.
    pub fn broadcast(&self, message: &OutboundMessage) -> DeliveryReport {
        let recipients = self.registry.snapshot();
        self.deliver(message, &recipients)
    }

    /// Send to a fixed recipient list. One recipient's failure never affects another.
    pub fn deliver(&self, message: &OutboundMessage, recipients: &[Arc<Connection>]) -> DeliveryReport {
        let mut report = DeliveryReport::default();
        if recipients.is_empty() {
            return report;
        }

        let payload = match message.to_json() {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "Failed to serialize outbound message");
                return report;
            }
        };

        for conn in recipients {
            match conn.deliver(payload.clone()) {
                Ok(()) => report.delivered += 1,
                Err(DeliveryError::QueueFull) => {
                    debug!(connection_id = %conn.id(), "Send queue full, dropping message");
                    report.dropped.push(conn.id().clone());
                }
                Err(DeliveryError::Closed) => {
                    if self.evict(conn) {
                        report.evicted.push(conn.id().clone());
                    }
                }
            }
        }

        self.metrics
            .counter_inc("broadcast.delivered", &[], report.delivered as u64);
        if !report.dropped.is_empty() {
            self.metrics
                .counter_inc("broadcast.dropped", &[], report.dropped.len() as u64);
        }
        if !report.evicted.is_empty() {
            self.metrics
                .counter_inc("broadcast.evicted", &[], report.evicted.len() as u64);
            self.metrics
                .gauge_set("ws.connections.active", &[], self.registry.len() as i64);
        }
        report
    }

    /// Reply to a single connection, evicting it if its channel is gone.
    ///
    /// Replies are counted under `replies.delivered`, apart from fan-out traffic.
    pub fn send_to(&self, conn: &Connection, message: &OutboundMessage) -> Result<(), DeliveryError> {
        // an unserializable reply is dropped the same way a saturated queue drops it
        let payload = message.to_json().map_err(|e| {
            warn!(error = %e, "Failed to serialize reply");
            DeliveryError::QueueFull
        })?;
        match conn.deliver(payload) {
            Ok(()) => {
                self.metrics.counter_inc("replies.delivered", &[], 1);
                Ok(())
            }
            Err(DeliveryError::Closed) => {
                if self.evict(conn) {
                    self.metrics.counter_inc("broadcast.evicted", &[], 1);
                    self.metrics
                        .gauge_set("ws.connections.active", &[], self.registry.len() as i64);
                }
                Err(DeliveryError::Closed)
            }
            Err(e) => Err(e),
        }
    }

    /// Returns false when the connection had already left the registry.
    fn evict(&self, conn: &Connection) -> bool {
        let removed = self.registry.unregister(conn.id()).is_some();
        if removed {
            info!(connection_id = %conn.id(), "Evicted closed connection");
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use signcast_core::{BoundingBox, Detection, DetectionResult};
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    fn setup() -> (Arc<ConnectionRegistry>, Arc<MetricsRecorder>, Broadcaster) {
        let registry = Arc::new(ConnectionRegistry::new());
        let metrics = Arc::new(MetricsRecorder::new());
        let broadcaster = Broadcaster::new(Arc::clone(&registry), Arc::clone(&metrics));
        (registry, metrics, broadcaster)
    }

    fn join(registry: &ConnectionRegistry, capacity: usize) -> (Arc<Connection>, mpsc::Receiver<String>) {
        let (conn, rx) = Connection::open(capacity, CancellationToken::new(), None);
        registry.register(Arc::clone(&conn));
        (conn, rx)
    }

    fn result_message() -> OutboundMessage {
        DetectionResult {
            detections: vec![Detection::new(2, "hello", 0.95, BoundingBox::new(1, 2, 3, 4))],
            annotated_image: "aGVsbG8=".into(),
            timestamp_millis: 1_700_000_000_000,
        }
        .to_message()
    }

    #[test]
    fn broadcast_reaches_every_connection() {
        let (registry, metrics, broadcaster) = setup();
        let (_a, mut rx_a) = join(&registry, 4);
        let (_b, mut rx_b) = join(&registry, 4);

        let report = broadcaster.broadcast(&result_message());
        assert_eq!(report.delivered, 2);

        let a = rx_a.try_recv().unwrap();
        let b = rx_b.try_recv().unwrap();
        assert_eq!(a, b);
        let value: serde_json::Value = serde_json::from_str(&a).unwrap();
        assert_eq!(value["type"], "detection_result");
        assert_eq!(metrics.counter_get("broadcast.delivered", &[]), 2);
    }

    #[test]
    fn empty_registry_is_a_no_op() {
        let (_registry, _metrics, broadcaster) = setup();
        let report = broadcaster.broadcast(&result_message());
        assert_eq!(report, DeliveryReport::default());
    }

    #[test]
    fn closed_recipient_is_evicted_others_still_receive() {
        let (registry, metrics, broadcaster) = setup();
        let (gone, rx_gone) = join(&registry, 4);
        let (_ok, mut rx_ok) = join(&registry, 4);
        drop(rx_gone);

        let report = broadcaster.broadcast(&result_message());
        assert_eq!(report.delivered, 1);
        assert_eq!(report.evicted, vec![gone.id().clone()]);
        assert!(!registry.contains(gone.id()));
        assert!(rx_ok.try_recv().is_ok());
        assert_eq!(metrics.counter_get("broadcast.evicted", &[]), 1);
        assert_eq!(metrics.gauge_get("ws.connections.active", &[]), 1);
    }

    #[test]
    fn full_queue_drops_for_that_recipient_only() {
        let (registry, metrics, broadcaster) = setup();
        let (slow, _rx_slow) = join(&registry, 1);
        let (_fast, mut rx_fast) = join(&registry, 8);

        broadcaster.broadcast(&OutboundMessage::Pong);
        let report = broadcaster.broadcast(&OutboundMessage::Pong);

        assert_eq!(report.dropped, vec![slow.id().clone()]);
        assert!(registry.contains(slow.id()));
        assert_eq!(rx_fast.try_recv().unwrap(), r#"{"type":"pong"}"#);
        assert_eq!(rx_fast.try_recv().unwrap(), r#"{"type":"pong"}"#);
        assert_eq!(metrics.counter_get("broadcast.dropped", &[]), 1);
    }

    #[test]
    fn send_to_targets_one_connection() {
        let (registry, metrics, broadcaster) = setup();
        let (a, mut rx_a) = join(&registry, 4);
        let (_b, mut rx_b) = join(&registry, 4);

        broadcaster.send_to(&a, &OutboundMessage::Pong).unwrap();
        assert_eq!(rx_a.try_recv().unwrap(), r#"{"type":"pong"}"#);
        assert!(rx_b.try_recv().is_err());
        assert_eq!(metrics.counter_get("replies.delivered", &[]), 1);
        assert_eq!(metrics.counter_get("broadcast.delivered", &[]), 0);
    }

    #[test]
    fn send_to_closed_connection_evicts() {
        let (registry, metrics, broadcaster) = setup();
        let (a, rx_a) = join(&registry, 4);
        drop(rx_a);
        assert_eq!(
            broadcaster.send_to(&a, &OutboundMessage::Pong),
            Err(DeliveryError::Closed)
        );
        assert!(registry.is_empty());
        assert_eq!(metrics.counter_get("broadcast.evicted", &[]), 1);
        assert_eq!(metrics.counter_get("replies.delivered", &[]), 0);
    }

    #[test]
    fn send_to_full_queue_reports_queue_full() {
        let (registry, metrics, broadcaster) = setup();
        let (a, _rx_a) = join(&registry, 1);

        broadcaster.send_to(&a, &OutboundMessage::Pong).unwrap();
        assert_eq!(
            broadcaster.send_to(&a, &OutboundMessage::Pong),
            Err(DeliveryError::QueueFull)
        );
        assert!(registry.contains(a.id()));
        assert_eq!(metrics.counter_get("replies.delivered", &[]), 1);
    }

    #[test]
    fn recipient_already_unregistered_is_not_counted_as_evicted() {
        let (registry, metrics, broadcaster) = setup();
        let (gone, rx_gone) = join(&registry, 4);
        let (_ok, mut rx_ok) = join(&registry, 4);
        let recipients = registry.snapshot();

        // the session tore itself down between snapshot and delivery
        registry.unregister(gone.id());
        drop(rx_gone);

        let report = broadcaster.deliver(&result_message(), &recipients);
        assert_eq!(report.delivered, 1);
        assert!(report.evicted.is_empty());
        assert!(rx_ok.try_recv().is_ok());
        assert_eq!(metrics.counter_get("broadcast.evicted", &[]), 0);

        assert_eq!(
            broadcaster.send_to(&gone, &OutboundMessage::Pong),
            Err(DeliveryError::Closed)
        );
        assert_eq!(metrics.counter_get("broadcast.evicted", &[]), 0);
    }

    #[test]
    fn delivery_mode_parse() {
        assert_eq!("Broadcast".parse::<DeliveryMode>().unwrap(), DeliveryMode::Broadcast);
        assert_eq!("unicast".parse::<DeliveryMode>().unwrap(), DeliveryMode::Unicast);
        assert!("multicast".parse::<DeliveryMode>().is_err());
        assert_eq!(DeliveryMode::default(), DeliveryMode::Broadcast);
    }
}
