use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use signcast_core::{Detection, DetectionError, DetectorBackend, RawImage};

/// Pre-programmed outcome for one `detect` call.
#[derive(Clone, Debug)]
pub enum ScriptedResponse {
    Detections(Vec<Detection>),
    Error(DetectionError),
    /// Block the calling thread, then yield the inner response.
    Delay(Duration, Box<ScriptedResponse>),
}

impl ScriptedResponse {
    pub fn delayed(delay: Duration, inner: ScriptedResponse) -> Self {
        Self::Delay(delay, Box::new(inner))
    }

    fn resolve(self) -> Result<Vec<Detection>, DetectionError> {
        match self {
            Self::Detections(d) => Ok(d),
            Self::Error(e) => Err(e),
            Self::Delay(delay, inner) => {
                std::thread::sleep(delay);
                inner.resolve()
            }
        }
    }
}

/// Deterministic backend for tests and demos: replays responses in order, then
/// repeats the fallback forever.
pub struct ScriptedDetector {
    script: VecDeque<ScriptedResponse>,
    fallback: ScriptedResponse,
    calls: Arc<AtomicUsize>,
    warm_up_error: Option<DetectionError>,
}

impl ScriptedDetector {
    pub fn new(script: Vec<ScriptedResponse>) -> Self {
        Self {
            script: script.into(),
            fallback: ScriptedResponse::Detections(Vec::new()),
            calls: Arc::new(AtomicUsize::new(0)),
            warm_up_error: None,
        }
    }

    /// Always answer with the same detections.
    pub fn always(detections: Vec<Detection>) -> Self {
        Self::new(Vec::new()).with_fallback(ScriptedResponse::Detections(detections))
    }

    pub fn with_fallback(mut self, fallback: ScriptedResponse) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn with_failing_warm_up(mut self, error: DetectionError) -> Self {
        self.warm_up_error = Some(error);
        self
    }

    /// Shared counter of `detect` calls, usable after the backend moved into a worker.
    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

impl DetectorBackend for ScriptedDetector {
    fn name(&self) -> &str {
        "scripted"
    }

    fn detect(&mut self, _image: &RawImage) -> Result<Vec<Detection>, DetectionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self
            .script
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        next.resolve()
    }

    fn warm_up(&mut self) -> Result<(), DetectionError> {
        match &self.warm_up_error {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }
}
