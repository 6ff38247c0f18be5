pub mod detection;
pub mod detector;
pub mod errors;
pub mod ids;
pub mod labels;
pub mod messages;

pub use detection::{filter_by_confidence, BoundingBox, Detection, DetectionResult};
pub use detector::{DetectorBackend, RawImage};
pub use errors::{DecodeError, DeliveryError, DetectionError, EncodeError, ProtocolError};
pub use ids::{ConnectionId, FrameId};
pub use labels::LabelSet;
pub use messages::{InboundMessage, OutboundMessage, WireCoordinates, WireDetection};
