//! Transport codec for camera frames.
//!
//! Frames travel as base64 text, optionally wrapped in a `data:` URI header. Inbound
//! payloads may be any format the `image` crate was built with; outbound annotated
//! frames are JPEG or PNG depending on [`CodecConfig`].

use std::io::Cursor;
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::ImageFormat;
use signcast_core::{DecodeError, EncodeError, RawImage};

/// Encoding used for outbound frames.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Jpeg,
    Png,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" => Ok(Self::Jpeg),
            "png" => Ok(Self::Png),
            other => Err(format!("unsupported output format: {other}")),
        }
    }
}

#[derive(Clone, Debug)]
pub struct CodecConfig {
    pub format: OutputFormat,
    /// 1-100, only used for JPEG.
    pub jpeg_quality: u8,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::Jpeg,
            jpeg_quality: 85,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct FrameCodec {
    config: CodecConfig,
}

impl FrameCodec {
    pub fn new(config: CodecConfig) -> Self {
        Self { config }
    }

    /// Decode a transport payload into an RGB raster.
    pub fn decode(&self, payload: &str) -> Result<RawImage, DecodeError> {
        let encoded = strip_data_uri(payload.trim());
        if encoded.is_empty() {
            return Err(DecodeError::EmptyPayload);
        }

        let decoded = if encoded.contains(char::is_whitespace) {
            let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
            STANDARD.decode(compact)
        } else {
            STANDARD.decode(encoded)
        };
        let bytes = decoded.map_err(|e| DecodeError::Transport(e.to_string()))?;

        if bytes.is_empty() {
            return Err(DecodeError::EmptyPayload);
        }

        let raster =
            image::load_from_memory(&bytes).map_err(|e| DecodeError::Image(e.to_string()))?;
        Ok(raster.to_rgb8())
    }

    /// Encode a raster into a transport payload (bare base64, no URI header).
    pub fn encode(&self, image: &RawImage) -> Result<String, EncodeError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(EncodeError::EmptyImage {
                width: image.width(),
                height: image.height(),
            });
        }

        let mut buffer = Vec::new();
        let written = match self.config.format {
            OutputFormat::Jpeg => {
                let quality = self.config.jpeg_quality.clamp(1, 100);
                JpegEncoder::new_with_quality(&mut buffer, quality).encode_image(image)
            }
            OutputFormat::Png => image.write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png),
        };
        written.map_err(|e| EncodeError::Encoder(e.to_string()))?;

        Ok(STANDARD.encode(buffer))
    }
}

/// Drop a `data:<mime>;base64,` header if present.
fn strip_data_uri(payload: &str) -> &str {
    if payload.starts_with("data:") {
        if let Some((_, rest)) = payload.split_once(',') {
            return rest;
        }
    }
    payload
}
