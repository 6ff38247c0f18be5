pub mod dispatch;
pub mod pipeline;
pub mod registry;
pub mod server;
pub mod session;

pub use dispatch::{Broadcaster, DeliveryMode, DeliveryReport};
pub use pipeline::{AnalyzedFrame, FrameError, FramePipeline};
pub use registry::{Connection, ConnectionRegistry, ConnectionState};
pub use server::{build_router, start, AppState, ServerConfig, ServerHandle};
pub use session::{run_session, SessionShared};
