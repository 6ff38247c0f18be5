pub mod annotate;
pub mod backends;
pub mod codec;
pub mod worker;

pub use annotate::annotate;
pub use backends::{PlaceholderDetector, ScriptedDetector, ScriptedResponse};
pub use codec::{CodecConfig, FrameCodec, OutputFormat};
pub use worker::{DetectorConfig, DetectorHandle, DetectorWorker};
