//! Gateway Frame Codec
//!
//! Every WebSocket text frame is a JSON envelope.
//!
//! ```json
//! {"event":"subscribe_channel","data":{"channel":"ops"},"id":7}   // outbound, ack requested
//! {"event":"surge_created","data":{"surge":{"_id":"s1"}}}         // inbound push
//! {"ack":7,"data":{"success":true}}                              // inbound acknowledgment
//! ```

use serde::Serialize;
use serde_json::Value;

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON encoding/decoding failed.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// Valid JSON that is neither an event nor an acknowledgment.
    #[error("frame has neither 'event' nor 'ack'")]
    MissingEnvelope,
}

/// Frame sent to the gateway.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundFrame {
    /// Event name.
    pub event: String,
    /// Payload.
    pub data: Value,
    /// Acknowledgment id, when a reply is expected.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
}

impl OutboundFrame {
    /// Fire-and-forget frame.
    #[must_use]
    pub fn event(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
            id: None,
        }
    }

    /// Frame expecting an acknowledgment with `id`.
    #[must_use]
    pub fn with_ack(event: impl Into<String>, data: Value, id: u64) -> Self {
        Self {
            event: event.into(),
            data,
            id: Some(id),
        }
    }
}

/// Frame received from the gateway.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    /// Server push.
    Event {
        /// Event name.
        event: String,
        /// Payload (`null` when absent).
        data: Value,
    },
    /// Reply to an outbound frame.
    Ack {
        /// Id of the outbound frame.
        id: u64,
        /// Reply body (`null` when absent).
        data: Value,
    },
}

/// JSON envelope codec.
#[derive(Debug, Default, Clone, Copy)]
pub struct FrameCodec;

impl FrameCodec {
    /// Create a new codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Encode an outbound frame.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn encode(&self, frame: &OutboundFrame) -> Result<String, CodecError> {
        Ok(serde_json::to_string(frame)?)
    }

    /// Decode an inbound frame. Acknowledgments take precedence over events.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid JSON or a frame without an envelope.
    pub fn decode(&self, text: &str) -> Result<InboundFrame, CodecError> {
        let mut value: Value = serde_json::from_str(text)?;
        let data = value
            .get_mut("data")
            .map(Value::take)
            .unwrap_or(Value::Null);

        if let Some(id) = value.get("ack").and_then(Value::as_u64) {
            return Ok(InboundFrame::Ack { id, data });
        }
        if let Some(event) = value.get("event").and_then(Value::as_str) {
            return Ok(InboundFrame::Event {
                event: event.to_string(),
                data,
            });
        }
        Err(CodecError::MissingEnvelope)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn encode_without_ack_omits_id() {
        let text = FrameCodec::new()
            .encode(&OutboundFrame::event("heartbeat_response", json!({})))
            .unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value, json!({ "event": "heartbeat_response", "data": {} }));
    }

    #[test]
    fn encode_with_ack_carries_id() {
        let text = FrameCodec::new()
            .encode(&OutboundFrame::with_ack(
                "subscribe_channel",
                json!({ "channel": "ops" }),
                7,
            ))
            .unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["id"], 7);
        assert_eq!(value["data"]["channel"], "ops");
    }

    #[test]
    fn decode_event() {
        let frame = FrameCodec::new()
            .decode(r#"{"event":"surge_created","data":{"surge":{"_id":"s1"}}}"#)
            .unwrap();
        assert_eq!(
            frame,
            InboundFrame::Event {
                event: "surge_created".to_string(),
                data: json!({ "surge": { "_id": "s1" } }),
            }
        );
    }

    #[test]
    fn decode_ack_without_data() {
        let frame = FrameCodec::new().decode(r#"{"ack":3}"#).unwrap();
        assert_eq!(
            frame,
            InboundFrame::Ack {
                id: 3,
                data: Value::Null
            }
        );
    }

    #[test]
    fn decode_rejects_garbage() {
        let codec = FrameCodec::new();
        assert!(matches!(codec.decode("not json"), Err(CodecError::Json(_))));
        assert!(matches!(
            codec.decode(r#"{"hello":"world"}"#),
            Err(CodecError::MissingEnvelope)
        ));
    }
}
