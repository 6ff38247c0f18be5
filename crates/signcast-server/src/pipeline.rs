//! Decode, detect, filter and render one camera frame.
//!
//! Image work runs on the blocking pool so session tasks stay responsive; detection goes
//! through the shared [`DetectorHandle`]. The pipeline is split into [`FramePipeline::analyze`]
//! and [`FramePipeline::render`] so callers can skip rendering when nobody is listening.

use std::sync::Arc;

use signcast_core::{
    filter_by_confidence, DecodeError, Detection, DetectionError, DetectionResult, EncodeError,
    RawImage,
};
use signcast_telemetry::MetricsRecorder;
use signcast_vision::{annotate, DetectorHandle, FrameCodec};

/// Why a frame produced no result. Every variant is local to that frame.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Detection(#[from] DetectionError),
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error("frame task failed: {0}")]
    Task(String),
}

impl FrameError {
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Decode(_) => "decode",
            Self::Detection(DetectionError::Timeout(_)) => "timeout",
            Self::Detection(_) => "detection",
            Self::Encode(_) => "encode",
            Self::Task(_) => "task",
        }
    }
}

/// A decoded frame with its filtered detections, not yet rendered.
#[derive(Clone, Debug)]
pub struct AnalyzedFrame {
    pub image: Arc<RawImage>,
    pub detections: Vec<Detection>,
}

pub struct FramePipeline {
    codec: FrameCodec,
    detector: DetectorHandle,
    annotate: bool,
    metrics: Arc<MetricsRecorder>,
}

impl FramePipeline {
    pub fn new(
        codec: FrameCodec,
        detector: DetectorHandle,
        annotate: bool,
        metrics: Arc<MetricsRecorder>,
    ) -> Self {
        Self {
            codec,
            detector,
            annotate,
            metrics,
        }
    }

    /// Decode the payload, run detection and keep detections at or above `threshold`.
    pub async fn analyze(&self, payload: String, threshold: f32) -> Result<AnalyzedFrame, FrameError> {
        let codec = self.codec.clone();
        let image = tokio::task::spawn_blocking(move || codec.decode(&payload))
            .await
            .map_err(|e| FrameError::Task(e.to_string()))??;
        self.metrics.counter_inc("frames.decoded", &[], 1);

        let image = Arc::new(image);
        let raw = self.detector.detect(Arc::clone(&image)).await?;
        let detections = filter_by_confidence(raw, threshold);
        Ok(AnalyzedFrame { image, detections })
    }

    /// Draw the detections (if enabled), encode the frame and stamp the result.
    pub async fn render(&self, frame: AnalyzedFrame) -> Result<DetectionResult, FrameError> {
        let codec = self.codec.clone();
        let draw = self.annotate;
        let AnalyzedFrame { image, detections } = frame;

        let (encoded, detections) = tokio::task::spawn_blocking(move || {
            let encoded = if draw && !detections.is_empty() {
                codec.encode(&annotate(&image, &detections))
            } else {
                codec.encode(&image)
            };
            (encoded, detections)
        })
        .await
        .map_err(|e| FrameError::Task(e.to_string()))?;

        Ok(DetectionResult {
            detections,
            annotated_image: encoded?,
            timestamp_millis: chrono::Utc::now().timestamp_millis(),
        })
    }

    pub async fn process(&self, payload: String, threshold: f32) -> Result<DetectionResult, FrameError> {
        let analyzed = self.analyze(payload, threshold).await?;
        self.render(analyzed).await
    }
}
