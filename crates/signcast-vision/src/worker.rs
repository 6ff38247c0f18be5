//! Single-owner access point for the detector backend.
//!
//! The backend lives on one dedicated OS thread and is only reachable through a bounded
//! job queue, so calls from concurrent sessions are serialized and the backend itself
//! needs no internal synchronization. Sessions hold a cloneable [`DetectorHandle`].

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use signcast_core::{Detection, DetectionError, DetectorBackend, RawImage};
use signcast_telemetry::MetricsRecorder;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

#[derive(Clone, Debug)]
pub struct DetectorConfig {
    /// Jobs that may wait for the worker before callers start blocking.
    pub queue_depth: usize,
    /// Deadline for one detect round trip (queueing included). `None` waits forever.
    pub timeout: Option<Duration>,
    /// Run the backend once on a blank frame before serving jobs.
    pub warm_up: bool,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            queue_depth: 16,
            timeout: Some(Duration::from_secs(10)),
            warm_up: true,
        }
    }
}

type DetectReply = Result<Vec<Detection>, DetectionError>;

struct DetectJob {
    image: Arc<RawImage>,
    reply: oneshot::Sender<DetectReply>,
}

struct BackendStatus {
    name: String,
    ready: AtomicBool,
    processed: AtomicU64,
}

/// Owns the worker thread. Dropping every [`DetectorHandle`] stops it.
pub struct DetectorWorker {
    thread: thread::JoinHandle<()>,
}

impl DetectorWorker {
    /// Move `backend` onto its own thread and return the thread plus a handle to reach it.
    pub fn spawn<B>(
        backend: B,
        config: DetectorConfig,
        metrics: Arc<MetricsRecorder>,
    ) -> std::io::Result<(Self, DetectorHandle)>
    where
        B: DetectorBackend + 'static,
    {
        let (tx, rx) = mpsc::channel(config.queue_depth.max(1));
        let status = Arc::new(BackendStatus {
            name: backend.name().to_string(),
            ready: AtomicBool::new(false),
            processed: AtomicU64::new(0),
        });

        let thread_status = Arc::clone(&status);
        let warm_up = config.warm_up;
        let thread = thread::Builder::new()
            .name("detector-worker".into())
            .spawn(move || run_worker(backend, rx, thread_status, warm_up, metrics))?;

        let handle = DetectorHandle {
            tx,
            status,
            timeout: config.timeout,
        };
        Ok((Self { thread }, handle))
    }

    /// Block until the worker exits. Only returns once every handle is dropped.
    pub fn join(self) {
        if self.thread.join().is_err() {
            warn!("detector worker thread panicked");
        }
    }
}

fn run_worker<B: DetectorBackend>(
    mut backend: B,
    mut rx: mpsc::Receiver<DetectJob>,
    status: Arc<BackendStatus>,
    warm_up: bool,
    metrics: Arc<MetricsRecorder>,
) {
    if warm_up {
        let started = Instant::now();
        match backend.warm_up() {
            Ok(()) => {
                status.ready.store(true, Ordering::SeqCst);
                info!(
                    backend = %status.name,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Detector warmed up"
                );
            }
            Err(e) => {
                warn!(backend = %status.name, error = %e, "Detector warm-up failed, frames will be rejected");
            }
        }
    } else {
        status.ready.store(true, Ordering::SeqCst);
    }

    while let Some(job) = rx.blocking_recv() {
        if job.reply.is_closed() {
            debug!("Skipping detect job abandoned by its caller");
            continue;
        }

        let result = if status.ready.load(Ordering::SeqCst) {
            let started = Instant::now();
            let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| backend.detect(&job.image)))
                .unwrap_or_else(|_| Err(DetectionError::Backend("detector panicked".into())));
            metrics.histogram_observe(
                "detector.duration_ms",
                &[],
                started.elapsed().as_secs_f64() * 1000.0,
            );
            outcome
        } else {
            Err(DetectionError::Unavailable(format!(
                "{} failed to warm up",
                status.name
            )))
        };

        status.processed.fetch_add(1, Ordering::Relaxed);
        let _ = job.reply.send(result);
    }

    info!(backend = %status.name, "Detector worker stopped");
}

/// Cloneable entry point used by sessions.
#[derive(Clone)]
pub struct DetectorHandle {
    tx: mpsc::Sender<DetectJob>,
    status: Arc<BackendStatus>,
    timeout: Option<Duration>,
}

impl DetectorHandle {
    /// Queue one frame and wait for its detections, bounded by the configured deadline.
    ///
    /// The frame is shared with the worker rather than copied, so callers can keep an
    /// `Arc` to annotate it afterwards.
    pub async fn detect(
        &self,
        image: impl Into<Arc<RawImage>>,
    ) -> Result<Vec<Detection>, DetectionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let job = DetectJob {
            image: image.into(),
            reply: reply_tx,
        };

        let round_trip = async {
            if self.tx.send(job).await.is_err() {
                return Err(DetectionError::Unavailable("detector worker stopped".into()));
            }
            match reply_rx.await {
                Ok(reply) => reply,
                Err(_) => Err(DetectionError::Unavailable(
                    "detector worker dropped the job".into(),
                )),
            }
        };

        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, round_trip)
                .await
                .map_err(|_| DetectionError::Timeout(limit))?,
            None => round_trip.await,
        }
    }

    pub fn backend_name(&self) -> &str {
        &self.status.name
    }

    /// False until warm-up succeeds; stays false if it failed.
    pub fn is_ready(&self) -> bool {
        self.status.ready.load(Ordering::SeqCst)
    }

    /// Jobs the worker has answered, successful or not.
    pub fn frames_processed(&self) -> u64 {
        self.status.processed.load(Ordering::Relaxed)
    }
}
