use crate::detection::Detection;
use crate::errors::DetectionError;

/// Decoded 8-bit RGB raster handed to detectors.
pub type RawImage = image::RgbImage;

/// Side length of the blank raster used for warm-up.
pub const WARM_UP_SIZE: u32 = 48;

/// Object-detection model contract.
///
/// Backends take `&mut self`: callers never share a backend between threads directly,
/// they go through a single owner that serializes calls.
pub trait DetectorBackend: Send {
    fn name(&self) -> &str;

    /// Run the model on one frame. Confidences must already be normalized to `[0, 1]`
    /// and boxes expressed in the frame's pixel coordinates.
    fn detect(&mut self, image: &RawImage) -> Result<Vec<Detection>, DetectionError>;

    /// Prime the backend before the first real frame.
    fn warm_up(&mut self) -> Result<(), DetectionError> {
        let blank = RawImage::new(WARM_UP_SIZE, WARM_UP_SIZE);
        self.detect(&blank).map(|_| ())
    }
}

impl<T: DetectorBackend + ?Sized> DetectorBackend for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn detect(&mut self, image: &RawImage) -> Result<Vec<Detection>, DetectionError> {
        (**self).detect(image)
    }

    fn warm_up(&mut self) -> Result<(), DetectionError> {
        (**self).warm_up()
    }
}
