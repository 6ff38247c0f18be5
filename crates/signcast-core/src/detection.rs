use serde::{Deserialize, Serialize};

use crate::messages::{OutboundMessage, WireCoordinates, WireDetection};

/// Axis-aligned box in pixel coordinates. Always `xmin <= xmax` and `ymin <= ymax`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub xmin: i32,
    pub ymin: i32,
    pub xmax: i32,
    pub ymax: i32,
}

impl BoundingBox {
    /// Build a box from two corners in any order.
    pub fn new(x0: i32, y0: i32, x1: i32, y1: i32) -> Self {
        Self {
            xmin: x0.min(x1),
            ymin: y0.min(y1),
            xmax: x0.max(x1),
            ymax: y0.max(y1),
        }
    }

    /// Build a box from float corners as detectors emit them. Coordinates truncate toward zero.
    pub fn from_xyxy(xyxy: [f32; 4]) -> Self {
        Self::new(
            xyxy[0] as i32,
            xyxy[1] as i32,
            xyxy[2] as i32,
            xyxy[3] as i32,
        )
    }

    pub fn width(&self) -> u32 {
        self.xmax.abs_diff(self.xmin)
    }

    pub fn height(&self) -> u32 {
        self.ymax.abs_diff(self.ymin)
    }
}

/// One labeled, confidence-scored region returned by a detector.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub class_id: usize,
    pub label: String,
    /// Normalized to `[0, 1]`.
    pub confidence: f32,
    pub bbox: BoundingBox,
}

impl Detection {
    pub fn new(class_id: usize, label: impl Into<String>, confidence: f32, bbox: BoundingBox) -> Self {
        Self {
            class_id,
            label: label.into(),
            confidence,
            bbox,
        }
    }

    /// Confidence on the 0-100 display scale, rounded to two decimals.
    pub fn display_confidence(&self) -> f64 {
        (f64::from(self.confidence) * 10_000.0).round() / 100.0
    }

    fn to_wire(&self, index: usize) -> WireDetection {
        WireDetection {
            index,
            class_name: self.label.clone(),
            confidence: self.display_confidence(),
            coordinates: WireCoordinates {
                xmin: self.bbox.xmin,
                ymin: self.bbox.ymin,
                xmax: self.bbox.xmax,
                ymax: self.bbox.ymax,
            },
        }
    }
}

/// Keep exactly the detections with `confidence >= threshold`, in input order.
///
/// The threshold is not range-checked: anything `<= 0` keeps every detection,
/// anything `> 1` (or NaN) keeps none.
pub fn filter_by_confidence(detections: Vec<Detection>, threshold: f32) -> Vec<Detection> {
    detections
        .into_iter()
        .filter(|d| d.confidence >= threshold)
        .collect()
}

/// Outcome of one processed frame. Transient; never persisted.
#[derive(Clone, Debug, PartialEq)]
pub struct DetectionResult {
    /// Detector order, not re-sorted.
    pub detections: Vec<Detection>,
    pub annotated_image: String,
    pub timestamp_millis: i64,
}

impl DetectionResult {
    pub fn to_message(&self) -> OutboundMessage {
        OutboundMessage::DetectionResult {
            detections: self
                .detections
                .iter()
                .enumerate()
                .map(|(i, d)| d.to_wire(i))
                .collect(),
            image: self.annotated_image.clone(),
            timestamp: self.timestamp_millis,
        }
    }
}
