//! Wire protocol at the hub boundary.
//!
//! All frames are JSON objects with a `type` field. Client frames are
//! parsed leniently into [`ClientMessage`]; anything malformed or
//! unrecognized becomes an error reply rather than a dropped connection.

use std::collections::HashMap;

use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};

use crate::event::EventType;

/// Close code sent when the session limit is reached.
pub const CLOSE_CODE_AT_CAPACITY: u16 = 1013;

/// Close reason sent when the session limit is reached.
pub const CLOSE_REASON_AT_CAPACITY: &str = "Server at capacity";

/// Close code for a normal hub-initiated close (timeouts, shutdown).
pub const CLOSE_CODE_NORMAL: u16 = 1000;

/// A parsed client→hub frame.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    /// Narrow delivery to the given event types.
    Subscribe { types: Vec<EventType> },
    /// Remove event types from the subscription set.
    Unsubscribe { types: Vec<EventType> },
    /// Replace the session's filters.
    SetFilters {
        filters: HashMap<String, Value>,
    },
    /// Request a status snapshot.
    GetStatus,
    /// Trigger an analysis run.
    RunAnalysis,
    /// Application-level keepalive.
    Ping,
}

impl ClientMessage {
    /// Parse a client frame.
    ///
    /// # Errors
    ///
    /// Returns the message for the error reply: malformed JSON, a missing
    /// `type` field, or `Unknown message type: <t>`.
    pub fn parse(text: &str) -> Result<Self, String> {
        let value: Value =
            serde_json::from_str(text).map_err(|_| "Invalid message format".to_string())?;
        let message_type = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| "Missing message type".to_string())?;

        match message_type {
            "subscribe" => Ok(Self::Subscribe {
                types: parse_event_types(&value),
            }),
            "unsubscribe" => Ok(Self::Unsubscribe {
                types: parse_event_types(&value),
            }),
            "set_filters" => {
                let filters = value
                    .get("filters")
                    .and_then(Value::as_object)
                    .map(|m| m.clone().into_iter().collect())
                    .unwrap_or_default();
                Ok(Self::SetFilters { filters })
            }
            "get_status" => Ok(Self::GetStatus),
            "run_analysis" => Ok(Self::RunAnalysis),
            "ping" => Ok(Self::Ping),
            other => Err(format!("Unknown message type: {other}")),
        }
    }
}

fn parse_event_types(value: &Value) -> Vec<EventType> {
    value
        .get("types")
        .and_then(Value::as_array)
        .map(|types| {
            types
                .iter()
                .filter_map(|t| serde_json::from_value::<EventType>(t.clone()).ok())
                .collect()
        })
        .unwrap_or_default()
}

/// A hub→client control frame.
///
/// Events themselves go out via [`crate::event::Event::to_wire`]; these
/// are the request/reply and lifecycle frames.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// First frame on every accepted connection.
    ConnectionEstablished {
        session_id: String,
        server_info: Value,
    },
    /// Acknowledges a `subscribe`.
    SubscriptionConfirmed { types: Vec<EventType> },
    /// Acknowledges an `unsubscribe`.
    UnsubscriptionConfirmed { types: Vec<EventType> },
    /// Acknowledges a `set_filters`.
    FiltersUpdated,
    /// Reply to `get_status`.
    CurrentStatus { data: Value },
    /// Reply to an application-level `ping`.
    Pong,
    /// Any request-level failure.
    Error { message: String },
}

impl ServerMessage {
    /// Serialize to the wire with a timestamp injected.
    #[must_use]
    pub fn to_wire(&self) -> String {
        let mut value = serde_json::to_value(self).unwrap_or_else(|_| json!({"type": "error"}));
        if let Some(object) = value.as_object_mut() {
            object.insert("timestamp".to_string(), json!(Utc::now()));
        }
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_subscribe_with_types() {
        let msg =
            ClientMessage::parse(r#"{"type":"subscribe","types":["score_update","iteration_end"]}"#)
                .unwrap();
        assert_eq!(
            msg,
            ClientMessage::Subscribe {
                types: vec![EventType::ScoreUpdate, EventType::IterationEnd]
            }
        );
    }

    #[test]
    fn test_parse_subscribe_ignores_unknown_event_types() {
        let msg = ClientMessage::parse(r#"{"type":"subscribe","types":["score_update","bogus"]}"#)
            .unwrap();
        assert_eq!(
            msg,
            ClientMessage::Subscribe {
                types: vec![EventType::ScoreUpdate]
            }
        );
    }

    #[test]
    fn test_parse_simple_requests() {
        assert_eq!(
            ClientMessage::parse(r#"{"type":"get_status"}"#).unwrap(),
            ClientMessage::GetStatus
        );
        assert_eq!(
            ClientMessage::parse(r#"{"type":"run_analysis"}"#).unwrap(),
            ClientMessage::RunAnalysis
        );
        assert_eq!(
            ClientMessage::parse(r#"{"type":"ping"}"#).unwrap(),
            ClientMessage::Ping
        );
    }

    #[test]
    fn test_parse_set_filters() {
        let msg =
            ClientMessage::parse(r#"{"type":"set_filters","filters":{"min_score":50}}"#).unwrap();
        match msg {
            ClientMessage::SetFilters { filters } => {
                assert_eq!(filters.get("min_score"), Some(&json!(50)));
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_type_names_the_type() {
        let err = ClientMessage::parse(r#"{"type":"teleport"}"#).unwrap_err();
        assert_eq!(err, "Unknown message type: teleport");
    }

    #[test]
    fn test_malformed_json_is_an_error_reply() {
        assert_eq!(
            ClientMessage::parse("not json").unwrap_err(),
            "Invalid message format"
        );
    }

    #[test]
    fn test_missing_type_field() {
        assert_eq!(
            ClientMessage::parse(r#"{"data":{}}"#).unwrap_err(),
            "Missing message type"
        );
    }

    #[test]
    fn test_server_message_wire_shape() {
        let wire = ServerMessage::ConnectionEstablished {
            session_id: "abc".to_string(),
            server_info: json!({"version": "0.1.0"}),
        }
        .to_wire();
        assert!(wire.contains(r#""type":"connection_established""#));
        assert!(wire.contains(r#""session_id":"abc""#));
        assert!(wire.contains("timestamp"));
    }

    #[test]
    fn test_error_message_wire_shape() {
        let wire = ServerMessage::Error {
            message: "Unknown message type: x".to_string(),
        }
        .to_wire();
        assert!(wire.contains(r#""type":"error""#));
        assert!(wire.contains("Unknown message type: x"));
    }
}
