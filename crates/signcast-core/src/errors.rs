use std::time::Duration;

/// Failure turning a transport payload into a raster.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("empty image payload")]
    EmptyPayload,
    #[error("invalid transport encoding: {0}")]
    Transport(String),
    #[error("unsupported or corrupt image: {0}")]
    Image(String),
}

impl DecodeError {
    /// Short classification string for logging/metrics.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::EmptyPayload => "empty_payload",
            Self::Transport(_) => "transport",
            Self::Image(_) => "image",
        }
    }
}

/// Failure turning an annotated raster back into a transport payload.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum EncodeError {
    #[error("cannot encode empty image ({width}x{height})")]
    EmptyImage { width: u32, height: u32 },
    #[error("image encoder failed: {0}")]
    Encoder(String),
}

/// Failure inside, or on the way to, the detector backend.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum DetectionError {
    #[error("detector unavailable: {0}")]
    Unavailable(String),
    #[error("invalid image for detector: {0}")]
    InvalidImage(String),
    #[error("detection timed out after {0:?}")]
    Timeout(Duration),
    #[error("detector backend failed: {0}")]
    Backend(String),
}

impl DetectionError {
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Unavailable(_) => "unavailable",
            Self::InvalidImage(_) => "invalid_image",
            Self::Timeout(_) => "timeout",
            Self::Backend(_) => "backend",
        }
    }
}

/// Failure handing a message to one recipient.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    /// The recipient's channel is gone. The recipient must be evicted.
    #[error("connection closed")]
    Closed,
    /// The recipient's outbound queue is saturated; this message is dropped for it only.
    #[error("send queue full")]
    QueueFull,
}

impl DeliveryError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Closed)
    }

    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::QueueFull => "queue_full",
        }
    }
}

/// Inbound payload that could not be understood.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    Malformed(String),
    #[error("binary frames are not supported")]
    Binary,
}

impl ProtocolError {
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Malformed(_) => "malformed",
            Self::Binary => "binary",
        }
    }
}
