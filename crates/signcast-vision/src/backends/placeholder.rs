use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use signcast_core::{
    BoundingBox, Detection, DetectionError, DetectorBackend, LabelSet, RawImage,
};

/// Smallest box side the placeholder will emit, in pixels.
const MIN_BOX_SIDE: u32 = 8;

/// Model-free backend that synthesises plausible detections.
///
/// Lets the service run end to end without model weights. Every frame yields
/// `0..=max_detections` boxes inside the frame with labels drawn from the label set
/// and confidences in `[0.3, 1.0)`.
pub struct PlaceholderDetector {
    labels: LabelSet,
    max_detections: usize,
    rng: StdRng,
}

impl PlaceholderDetector {
    pub fn new(labels: LabelSet, max_detections: usize) -> Self {
        Self {
            labels,
            max_detections,
            rng: StdRng::from_entropy(),
        }
    }

    /// Reproducible output for a given seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    fn random_box(&mut self, width: u32, height: u32) -> BoundingBox {
        let side_w = self.rng.gen_range(MIN_BOX_SIDE..=width);
        let side_h = self.rng.gen_range(MIN_BOX_SIDE..=height);
        let x = self.rng.gen_range(0..=width - side_w);
        let y = self.rng.gen_range(0..=height - side_h);
        BoundingBox::new(x as i32, y as i32, (x + side_w) as i32, (y + side_h) as i32)
    }
}

impl DetectorBackend for PlaceholderDetector {
    fn name(&self) -> &str {
        "placeholder"
    }

    fn detect(&mut self, image: &RawImage) -> Result<Vec<Detection>, DetectionError> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(DetectionError::InvalidImage(format!(
                "empty frame {width}x{height}"
            )));
        }
        if width < MIN_BOX_SIDE || height < MIN_BOX_SIDE || self.labels.is_empty() {
            return Ok(Vec::new());
        }

        let count = self.rng.gen_range(0..=self.max_detections);
        let mut detections = Vec::with_capacity(count);
        for _ in 0..count {
            let class_id = self.rng.gen_range(0..self.labels.len());
            let confidence: f32 = self.rng.gen_range(0.3..1.0);
            let bbox = self.random_box(width, height);
            detections.push(Detection::new(
                class_id,
                self.labels.name(class_id),
                confidence,
                bbox,
            ));
        }
        Ok(detections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detections_stay_inside_frame() {
        let mut detector = PlaceholderDetector::new(LabelSet::sign_vocabulary(), 5).with_seed(7);
        let frame = RawImage::new(120, 80);
        for _ in 0..50 {
            for d in detector.detect(&frame).unwrap() {
                assert!(d.bbox.xmin >= 0 && d.bbox.xmax <= 120);
                assert!(d.bbox.ymin >= 0 && d.bbox.ymax <= 80);
                assert!(d.bbox.width() >= MIN_BOX_SIDE);
                assert!((0.3..1.0).contains(&d.confidence));
                assert_eq!(d.label, LabelSet::sign_vocabulary().name(d.class_id));
            }
        }
    }

    #[test]
    fn seeded_output_is_reproducible() {
        let frame = RawImage::new(64, 64);
        let mut a = PlaceholderDetector::new(LabelSet::default(), 4).with_seed(42);
        let mut b = PlaceholderDetector::new(LabelSet::default(), 4).with_seed(42);
        for _ in 0..10 {
            assert_eq!(a.detect(&frame).unwrap(), b.detect(&frame).unwrap());
        }
    }

    #[test]
    fn respects_max_detections() {
        let mut detector = PlaceholderDetector::new(LabelSet::default(), 2).with_seed(1);
        let frame = RawImage::new(64, 64);
        for _ in 0..50 {
            assert!(detector.detect(&frame).unwrap().len() <= 2);
        }
    }

    #[test]
    fn tiny_frames_yield_nothing() {
        let mut detector = PlaceholderDetector::new(LabelSet::default(), 3).with_seed(1);
        assert!(detector.detect(&RawImage::new(4, 4)).unwrap().is_empty());
    }

    #[test]
    fn empty_frame_is_invalid() {
        let mut detector = PlaceholderDetector::new(LabelSet::default(), 3);
        assert!(matches!(
            detector.detect(&RawImage::new(0, 0)),
            Err(DetectionError::InvalidImage(_))
        ));
    }

    #[test]
    fn warm_up_succeeds() {
        let mut detector = PlaceholderDetector::new(LabelSet::default(), 3);
        detector.warm_up().unwrap();
    }
}
