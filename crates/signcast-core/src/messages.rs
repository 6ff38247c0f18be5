use serde::{Deserialize, Serialize};

use crate::errors::ProtocolError;

/// Confidence threshold used when a frame does not carry one.
pub const DEFAULT_CONFIDENCE: f32 = 0.5;

fn default_confidence() -> f32 {
    DEFAULT_CONFIDENCE
}

/// Messages a client sends over its channel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum InboundMessage {
    #[serde(rename = "camera_frame")]
    CameraFrame {
        image: String,
        #[serde(default = "default_confidence")]
        confidence: f32,
    },

    #[serde(rename = "ping")]
    Ping,
}

impl InboundMessage {
    /// Parse one received text payload.
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(raw).map_err(|e| ProtocolError::Malformed(e.to_string()))
    }
}

/// Messages the service sends to clients.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OutboundMessage {
    #[serde(rename = "detection_result")]
    DetectionResult {
        detections: Vec<WireDetection>,
        image: String,
        timestamp: i64,
    },

    #[serde(rename = "pong")]
    Pong,
}

impl OutboundMessage {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Wire form of a detection. Confidence is on the 0-100 display scale.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WireDetection {
    pub index: usize,
    #[serde(rename = "className")]
    pub class_name: String,
    pub confidence: f64,
    pub coordinates: WireCoordinates,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireCoordinates {
    pub xmin: i32,
    pub ymin: i32,
    pub xmax: i32,
    pub ymax: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_camera_frame_with_confidence() {
        let msg = InboundMessage::parse(r#"{"type":"camera_frame","image":"AAAA","confidence":0.9}"#)
            .unwrap();
        assert_eq!(
            msg,
            InboundMessage::CameraFrame {
                image: "AAAA".into(),
                confidence: 0.9
            }
        );
    }

    #[test]
    fn parse_camera_frame_defaults_confidence() {
        let msg = InboundMessage::parse(r#"{"type":"camera_frame","image":"AAAA"}"#).unwrap();
        match msg {
            InboundMessage::CameraFrame { confidence, .. } => assert_eq!(confidence, 0.5),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn parse_ping() {
        assert_eq!(InboundMessage::parse(r#"{"type":"ping"}"#).unwrap(), InboundMessage::Ping);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(matches!(
            InboundMessage::parse("not json"),
            Err(ProtocolError::Malformed(_))
        ));
        assert!(InboundMessage::parse(r#"{"type":"teleport"}"#).is_err());
        assert!(InboundMessage::parse(r#"{"type":"camera_frame"}"#).is_err());
        assert!(InboundMessage::parse(r#"{"image":"AAAA"}"#).is_err());
    }

    #[test]
    fn pong_wire_format() {
        assert_eq!(OutboundMessage::Pong.to_json().unwrap(), r#"{"type":"pong"}"#);
    }

    #[test]
    fn detection_result_wire_format() {
        let msg = OutboundMessage::DetectionResult {
            detections: vec![WireDetection {
                index: 0,
                class_name: "thank you".into(),
                confidence: 95.0,
                coordinates: WireCoordinates { xmin: 1, ymin: 2, xmax: 3, ymax: 4 },
            }],
            image: "img".into(),
            timestamp: 42,
        };
        let value: serde_json::Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(value["type"], "detection_result");
        assert_eq!(value["detections"][0]["className"], "thank you");
        assert_eq!(value["detections"][0]["confidence"], 95.0);
        assert_eq!(value["detections"][0]["coordinates"]["ymax"], 4);
        assert_eq!(value["image"], "img");
        assert_eq!(value["timestamp"], 42);
    }
}
