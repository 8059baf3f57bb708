//! Gateway Message Types
//!
//! Outbound event names and payloads, the control frames the connection
//! handles itself, and the rules for reading acknowledgment bodies.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Value, json};

use crate::application::ports::GatewayError;
use crate::domain::subscription::{HospitalFeed, Topic};

// =============================================================================
// Event Names
// =============================================================================

/// Server heartbeat.
pub const HEARTBEAT: &str = "heartbeat";
/// Surge-module heartbeat.
pub const SURGE_HEARTBEAT: &str = "surge_heartbeat";
/// Reply to a heartbeat.
pub const HEARTBEAT_RESPONSE: &str = "heartbeat_response";
/// Announcement sent after every connect.
pub const CLIENT_CONNECTED: &str = "client_connected";
/// Create a surge.
pub const CREATE_SURGE: &str = "create_surge";
/// Update bed availability for a unit.
pub const UPDATE_BED_SPACE: &str = "updateBedSpace";
/// Notify a hospital of an incoming emergency.
pub const EMERGENCY_NOTIFICATION: &str = "emergencyNotification";
/// Send a message to a channel.
pub const SEND_MESSAGE: &str = "send_message";
/// Round-trip latency check.
pub const PING: &str = "ping";
/// Gateway connection statistics.
pub const GET_CONNECTION_STATS: &str = "get_connection_stats";

const SUBSCRIPTION_CONFIRMATIONS: &[&str] = &[
    "hospital_subscription_confirmed",
    "regional_subscription_confirmed",
    "channel_subscription_confirmed",
];

/// Modules advertised in [`ClientConnected`].
pub const SUPPORTED_MODULES: [&str; 3] = ["surge", "bedspace", "general"];

// =============================================================================
// Control Frames
// =============================================================================

/// Inbound frames consumed by the connection rather than the normalizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlFrame {
    /// Heartbeat; answer with [`HEARTBEAT_RESPONSE`].
    Heartbeat,
    /// Subscription confirmation; logged only.
    SubscriptionConfirmed,
}

impl ControlFrame {
    /// Classify an inbound event name.
    #[must_use]
    pub fn from_event(name: &str) -> Option<Self> {
        match name {
            HEARTBEAT | SURGE_HEARTBEAT => Some(Self::Heartbeat),
            n if SUBSCRIPTION_CONFIRMATIONS.contains(&n) => Some(Self::SubscriptionConfirmed),
            _ => None,
        }
    }
}

// =============================================================================
// Topic Requests
// =============================================================================

/// Event name plus payload for a topic registration.
#[derive(Debug, Clone, PartialEq)]
pub struct TopicRequest {
    /// Event name.
    pub event: &'static str,
    /// Payload.
    pub data: Value,
}

/// Request that registers `topic`.
#[must_use]
pub fn subscribe_request(topic: &Topic) -> TopicRequest {
    match topic {
        Topic::Hospital {
            hospital_id,
            feed: HospitalFeed::Surge,
        } => TopicRequest {
            event: "subscribe_hospital_surges",
            data: json!({ "hospitalId": hospital_id }),
        },
        Topic::Hospital {
            hospital_id,
            feed: HospitalFeed::Bedspace,
        } => TopicRequest {
            event: "subscribe_hospital",
            data: json!({ "hospitalId": hospital_id }),
        },
        Topic::Region { .. } => TopicRequest {
            event: "subscribe_regional_surges",
            data: region_payload(topic),
        },
        Topic::Channel { name } => TopicRequest {
            event: "subscribe_channel",
            data: json!({ "channel": name }),
        },
    }
}

/// Request that removes `topic`.
#[must_use]
pub fn unsubscribe_request(topic: &Topic) -> TopicRequest {
    match topic {
        Topic::Hospital {
            hospital_id,
            feed: HospitalFeed::Surge,
        } => TopicRequest {
            event: "unsubscribe_hospital_surges",
            data: json!({ "hospitalId": hospital_id }),
        },
        Topic::Hospital {
            hospital_id,
            feed: HospitalFeed::Bedspace,
        } => TopicRequest {
            event: "unsubscribe_hospital",
            data: json!({ "hospitalId": hospital_id }),
        },
        Topic::Region { .. } => TopicRequest {
            event: "unsubscribe_regional_surges",
            data: region_payload(topic),
        },
        Topic::Channel { name } => TopicRequest {
            event: "unsubscribe_channel",
            data: json!({ "channel": name }),
        },
    }
}

/// Legacy room request retried when a bedspace registration is rejected.
///
/// The payload is the bare hospital id string.
#[must_use]
pub fn legacy_room_request(topic: &Topic, subscribe: bool) -> Option<TopicRequest> {
    match topic {
        Topic::Hospital {
            hospital_id,
            feed: HospitalFeed::Bedspace,
        } => Some(TopicRequest {
            event: if subscribe {
                "joinHospitalRoom"
            } else {
                "leaveHospitalRoom"
            },
            data: Value::String(hospital_id.clone()),
        }),
        _ => None,
    }
}

fn region_payload(topic: &Topic) -> Value {
    match topic {
        Topic::Region {
            latitude,
            longitude,
            radius_km,
        } => json!({
            "latitude": latitude,
            "longitude": longitude,
            "radius": radius_km * 1000.0,
            "radiusKm": radius_km,
        }),
        _ => Value::Null,
    }
}

// =============================================================================
// Request Payloads
// =============================================================================

/// Payload for [`CREATE_SURGE`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSurgeRequest {
    /// Hospital the surge is raised against.
    pub hospital_id: String,
    /// Latitude of the incident.
    pub latitude: f64,
    /// Longitude of the incident.
    pub longitude: f64,
    /// Street address.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    /// Emergency category.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emergency_type: Option<String>,
    /// Free-text description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Arbitrary extra data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl CreateSurgeRequest {
    /// Minimal request at a location.
    #[must_use]
    pub fn new(hospital_id: impl Into<String>, latitude: f64, longitude: f64) -> Self {
        Self {
            hospital_id: hospital_id.into(),
            latitude,
            longitude,
            address: None,
            emergency_type: None,
            description: None,
            metadata: None,
        }
    }
}

/// Payload for [`UPDATE_BED_SPACE`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBedSpaceRequest {
    /// Bed-space unit id.
    pub unit_id: String,
    /// New availability.
    pub available_beds: u32,
    /// Owning hospital.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hospital_id: Option<String>,
}

/// Payload for [`EMERGENCY_NOTIFICATION`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmergencyNotification {
    /// Hospital to notify.
    pub hospital_id: String,
    /// Human-readable location of the caller.
    pub user_location: String,
    /// Latitude of the caller.
    pub latitude: f64,
    /// Longitude of the caller.
    pub longitude: f64,
}

/// Payload for [`SEND_MESSAGE`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelMessage {
    /// Target channel.
    pub channel: String,
    /// Message body.
    pub message: Value,
}

/// Payload for [`CLIENT_CONNECTED`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConnected {
    /// Client instance id.
    pub client_id: String,
    /// Connect time.
    pub timestamp: DateTime<Utc>,
    /// Modules this client understands.
    pub supported_modules: [&'static str; 3],
}

impl ClientConnected {
    /// Announcement for `client_id`, stamped now.
    #[must_use]
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            timestamp: Utc::now(),
            supported_modules: SUPPORTED_MODULES,
        }
    }
}

// =============================================================================
// Acknowledgment Rules
// =============================================================================

/// How an acknowledgment body is judged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckRule {
    /// Accepted unless `success` is `false`. Subscriptions and generic emits.
    AcceptUnlessFailed,
    /// Accepted only when `success` is `true`; the reason is read from `reason_key` first.
    RequireSuccess {
        /// Field holding the rejection reason.
        reason_key: &'static str,
    },
    /// Any body is accepted.
    AcceptAny,
}

impl AckRule {
    /// Judge `body` as the reply to `event`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::ServerRejected`] when the rule rejects the body.
    pub fn apply(self, event: &str, body: Value) -> Result<Value, GatewayError> {
        let success = body.get("success").and_then(Value::as_bool);
        let (accepted, reason_key) = match self {
            Self::AcceptAny => (true, "message"),
            Self::AcceptUnlessFailed => (success != Some(false), "message"),
            Self::RequireSuccess { reason_key } => (success == Some(true), reason_key),
        };

        if accepted {
            return Ok(body);
        }

        let reason = [reason_key, "message", "error"]
            .iter()
            .find_map(|key| body.get(*key).and_then(Value::as_str))
            .unwrap_or("request failed")
            .to_string();
        Err(GatewayError::ServerRejected {
            event: event.to_string(),
            reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;
    use crate::domain::subscription::Distance;

    #[test_case(HEARTBEAT, Some(ControlFrame::Heartbeat) ; "heartbeat")]
    #[test_case(SURGE_HEARTBEAT, Some(ControlFrame::Heartbeat) ; "surge heartbeat")]
    #[test_case("channel_subscription_confirmed", Some(ControlFrame::SubscriptionConfirmed) ; "confirmation")]
    #[test_case("surge_created", None ; "domain event")]
    fn control_frames(name: &str, expected: Option<ControlFrame>) {
        assert_eq!(ControlFrame::from_event(name), expected);
    }

    #[test]
    fn topic_request_names() {
        assert_eq!(
            subscribe_request(&Topic::hospital_surges("h1")),
            TopicRequest {
                event: "subscribe_hospital_surges",
                data: json!({ "hospitalId": "h1" }),
            }
        );
        assert_eq!(
            subscribe_request(&Topic::hospital_bedspace("h1")).event,
            "subscribe_hospital"
        );
        assert_eq!(
            unsubscribe_request(&Topic::hospital_bedspace("h1")).event,
            "unsubscribe_hospital"
        );
        assert_eq!(
            subscribe_request(&Topic::channel("ops")).data,
            json!({ "channel": "ops" })
        );
    }

    #[test]
    fn region_payload_carries_both_units() {
        let request = subscribe_request(&Topic::region(6.5, 3.3, Distance::Meters(2500.0)));
        assert_eq!(request.event, "subscribe_regional_surges");
        assert_eq!(request.data["radius"], 2500.0);
        assert_eq!(request.data["radiusKm"], 2.5);
        assert_eq!(request.data["latitude"], 6.5);
    }

    #[test]
    fn legacy_room_only_for_bedspace() {
        let join = legacy_room_request(&Topic::hospital_bedspace("h1"), true).unwrap();
        assert_eq!(join.event, "joinHospitalRoom");
        assert_eq!(join.data, json!("h1"));

        let leave = legacy_room_request(&Topic::hospital_bedspace("h1"), false).unwrap();
        assert_eq!(leave.event, "leaveHospitalRoom");

        assert!(legacy_room_request(&Topic::hospital_surges("h1"), true).is_none());
    }

    #[test]
    fn create_surge_payload_is_camel_case() {
        let mut request = CreateSurgeRequest::new("h1", 1.0, 2.0);
        request.emergency_type = Some("fire".to_string());
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            json!({ "hospitalId": "h1", "latitude": 1.0, "longitude": 2.0, "emergencyType": "fire" })
        );
    }

    #[test]
    fn client_connected_advertises_modules() {
        let value = serde_json::to_value(ClientConnected::new("c1")).unwrap();
        assert_eq!(value["clientId"], "c1");
        assert_eq!(value["supportedModules"], json!(["surge", "bedspace", "general"]));
        assert!(value["timestamp"].is_string());
    }

    #[test]
    fn lenient_rule_accepts_missing_success() {
        let rule = AckRule::AcceptUnlessFailed;
        assert!(rule.apply("subscribe_channel", json!({})).is_ok());
        assert!(rule.apply("subscribe_channel", Value::Null).is_ok());

        let err = rule
            .apply(
                "subscribe_channel",
                json!({ "success": false, "message": "denied" }),
            )
            .unwrap_err();
        assert_eq!(
            err,
            GatewayError::ServerRejected {
                event: "subscribe_channel".to_string(),
                reason: "denied".to_string(),
            }
        );
    }

    #[test]
    fn strict_rule_requires_success_and_reads_reason_key() {
        let rule = AckRule::RequireSuccess { reason_key: "error" };
        assert!(rule.apply(UPDATE_BED_SPACE, json!({ "success": true })).is_ok());

        let err = rule
            .apply(
                UPDATE_BED_SPACE,
                json!({ "message": "ignored", "error": "unit not found" }),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            GatewayError::ServerRejected { ref reason, .. } if reason == "unit not found"
        ));

        let fallback = rule.apply(UPDATE_BED_SPACE, json!({})).unwrap_err();
        assert!(matches!(
            fallback,
            GatewayError::ServerRejected { ref reason, .. } if reason == "request failed"
        ));
    }
}
