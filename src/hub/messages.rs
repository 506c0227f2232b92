//! Wire envelope and message shapes for the notification socket

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::domain::{LaunchResult, Stage};
use crate::error::{LaunchError, Result};

/// Broadcast channel carrying stage-entry events
pub const MINT_PROGRESS: &str = "mint_progress";
/// Broadcast channel carrying terminal success events
pub const MINT_COMPLETE: &str = "mint_complete";
/// Broadcast channel carrying terminal failure events
pub const MINT_ERROR: &str = "mint_error";
/// Broadcast channel carrying cancellation events
pub const MINT_CANCELLED: &str = "mint_cancelled";

/// Envelope written to every client: `{ type, data, timestamp }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: Value,
    /// Server time, Unix milliseconds
    pub timestamp: i64,
}

/// A message before the hub stamps it
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub kind: String,
    pub data: Value,
}

impl OutboundMessage {
    pub fn new(kind: impl Into<String>, data: Value) -> Self {
        Self {
            kind: kind.into(),
            data,
        }
    }

    /// Stamp with the current server time
    pub fn stamp(self) -> Envelope {
        Envelope {
            kind: self.kind,
            data: self.data,
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    /// Welcome sent once on connect
    pub fn connection(id: Uuid) -> Self {
        Self::new(
            "connection",
            json!({
                "connectionId": id,
                "message": "Connected to launch notification hub",
            }),
        )
    }

    pub fn mint_progress(request_id: &str, stage: Stage, message: &str, progress: u8) -> Self {
        Self::new(
            MINT_PROGRESS,
            json!({
                "requestId": request_id,
                "stage": stage,
                "message": message,
                "progress": progress,
            }),
        )
    }

    pub fn mint_complete(request_id: &str, result: &LaunchResult) -> Self {
        Self::new(
            MINT_COMPLETE,
            json!({
                "requestId": request_id,
                "result": result,
            }),
        )
    }

    pub fn mint_error(request_id: &str, error: &str, stage: Stage) -> Self {
        Self::new(
            MINT_ERROR,
            json!({
                "requestId": request_id,
                "error": error,
                "stage": stage,
            }),
        )
    }

    pub fn mint_cancelled(request_id: &str, stage: Stage) -> Self {
        Self::new(
            MINT_CANCELLED,
            json!({
                "requestId": request_id,
                "stage": stage,
                "message": "Launch cancelled",
            }),
        )
    }

    /// Reply to a frame the server could not act on
    pub fn rejected(reason: &str) -> Self {
        Self::new("error", json!({ "message": reason }))
    }
}

/// Client → server messages
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    Subscribe { channel: String },
    Unsubscribe { channel: String },
    Authenticate { user_id: String },
}

#[derive(Deserialize)]
struct InboundFrame {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
}

impl ClientMessage {
    /// Parse a text frame. Extra envelope fields (e.g. a client timestamp) are ignored.
    pub fn parse(text: &str) -> Result<Self> {
        let frame: InboundFrame = serde_json::from_str(text)?;
        match frame.kind.as_str() {
            "subscribe" => Ok(ClientMessage::Subscribe {
                channel: required_str(&frame.data, "channel")?,
            }),
            "unsubscribe" => Ok(ClientMessage::Unsubscribe {
                channel: required_str(&frame.data, "channel")?,
            }),
            "authenticate" => Ok(ClientMessage::Authenticate {
                user_id: required_str(&frame.data, "userId")?,
            }),
            other => Err(LaunchError::Validation(format!(
                "unknown message type: {other}"
            ))),
        }
    }

    /// Serialize to the `{ type, data, timestamp }` envelope
    pub fn to_envelope(&self) -> Envelope {
        let (kind, data) = match self {
            ClientMessage::Subscribe { channel } => ("subscribe", json!({ "channel": channel })),
            ClientMessage::Unsubscribe { channel } => {
                ("unsubscribe", json!({ "channel": channel }))
            }
            ClientMessage::Authenticate { user_id } => {
                ("authenticate", json!({ "userId": user_id }))
            }
        };
        OutboundMessage::new(kind, data).stamp()
    }
}

fn required_str(data: &Value, key: &str) -> Result<String> {
    match data.get(key).and_then(Value::as_str).map(str::trim) {
        Some(value) if !value.is_empty() => Ok(value.to_string()),
        _ => Err(LaunchError::Validation(format!("missing field: {key}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_subscribe() {
        let msg = ClientMessage::parse(
            r#"{"type":"subscribe","data":{"channel":"mint_progress"},"timestamp":1}"#,
        )
        .unwrap();
        assert_eq!(
            msg,
            ClientMessage::Subscribe {
                channel: "mint_progress".into()
            }
        );
    }

    #[test]
    fn test_parse_authenticate_uses_camel_case() {
        let msg = ClientMessage::parse(r#"{"type":"authenticate","data":{"userId":"u-9"}}"#)
            .unwrap();
        assert_eq!(
            msg,
            ClientMessage::Authenticate {
                user_id: "u-9".into()
            }
        );
    }

    #[test]
    fn test_parse_rejects_unknown_and_incomplete() {
        assert!(ClientMessage::parse(r#"{"type":"shout","data":{}}"#).is_err());
        assert!(ClientMessage::parse(r#"{"type":"subscribe","data":{}}"#).is_err());
        assert!(ClientMessage::parse(r#"{"type":"subscribe","data":{"channel":"  "}}"#).is_err());
        assert!(ClientMessage::parse("not json").is_err());
    }

    #[test]
    fn test_progress_envelope_shape() {
        let env = OutboundMessage::mint_progress("r1", Stage::Bridging, "Bridging funds", 30).stamp();
        let value = serde_json::to_value(&env).unwrap();
        assert_eq!(value["type"], "mint_progress");
        assert_eq!(value["data"]["stage"], "bridging");
        assert_eq!(value["data"]["progress"], 30);
        assert!(value["timestamp"].as_i64().unwrap() > 0);
    }

    #[test]
    fn test_client_message_envelope_parses_back() {
        let original = ClientMessage::Authenticate {
            user_id: "u-1".into(),
        };
        let text = serde_json::to_string(&original.to_envelope()).unwrap();
        assert_eq!(ClientMessage::parse(&text).unwrap(), original);
    }
}
