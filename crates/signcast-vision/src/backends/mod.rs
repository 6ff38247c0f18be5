pub mod placeholder;
pub mod scripted;

pub use placeholder::PlaceholderDetector;
pub use scripted::{ScriptedDetector, ScriptedResponse};
