//! Command envelopes sent by controllers

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::{timestamp_now, Payload};

/// Every command a controller may send.
///
/// The set is closed: a `type` string outside this list fails to parse and
/// is answered with an error envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    Connect,
    Disconnect,
    Heartbeat,
    InitCamera,
    StartStreaming,
    StopStreaming,
    GetCameraStatus,
    SetDisplayWindow,
    GetFullStatus,
    GetBasicStatus,
    GetHealthMetrics,
    GetDiagnosticInfo,
    UpdateInterval,
}

impl CommandKind {
    /// Wire name of this command
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::Connect => "connect",
            CommandKind::Disconnect => "disconnect",
            CommandKind::Heartbeat => "heartbeat",
            CommandKind::InitCamera => "init_camera",
            CommandKind::StartStreaming => "start_streaming",
            CommandKind::StopStreaming => "stop_streaming",
            CommandKind::GetCameraStatus => "get_camera_status",
            CommandKind::SetDisplayWindow => "set_display_window",
            CommandKind::GetFullStatus => "get_full_status",
            CommandKind::GetBasicStatus => "get_basic_status",
            CommandKind::GetHealthMetrics => "get_health_metrics",
            CommandKind::GetDiagnosticInfo => "get_diagnostic_info",
            CommandKind::UpdateInterval => "update_interval",
        }
    }
}

impl std::fmt::Display for CommandKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A command received from a controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandEnvelope {
    /// Command kind
    #[serde(rename = "type")]
    pub kind: CommandKind,
    /// Command arguments
    #[serde(default, deserialize_with = "null_as_empty")]
    pub data: Payload,
    /// Optional caller-chosen identifier, echoed in the response
    #[serde(default)]
    pub client_id: Option<String>,
    /// When the command was created
    #[serde(default = "timestamp_now", deserialize_with = "null_as_now")]
    pub timestamp: String,
}

/// Why an inbound text message could not become a command
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Not valid JSON at all
    #[error("Invalid format")]
    InvalidFormat(#[source] serde_json::Error),

    /// Valid JSON that is not a command envelope (unknown type, wrong shape)
    #[error("{0}")]
    InvalidCommand(String),
}

impl CommandEnvelope {
    /// Create a command with empty data
    pub fn new(kind: CommandKind) -> Self {
        Self {
            kind,
            data: Payload::new(),
            client_id: None,
            timestamp: timestamp_now(),
        }
    }

    /// Attach a data field
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Attach a client id
    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Parse a raw text frame.
    ///
    /// Malformed JSON and well-formed-but-invalid envelopes are reported as
    /// distinct errors so the caller can answer each appropriately.
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(raw).map_err(ProtocolError::InvalidFormat)?;
        serde_json::from_value(value).map_err(|e| ProtocolError::InvalidCommand(e.to_string()))
    }

    /// Encode as JSON text
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Read a numeric argument
    pub fn number(&self, key: &str) -> Option<f64> {
        self.data.get(key).and_then(Value::as_f64)
    }

    /// Read a boolean argument
    pub fn flag(&self, key: &str) -> Option<bool> {
        self.data.get(key).and_then(Value::as_bool)
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Payload, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Payload>::deserialize(deserializer)?.unwrap_or_default())
}

fn null_as_now<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_else(timestamp_now))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_minimal_heartbeat() {
        let cmd = CommandEnvelope::parse(r#"{"type": "heartbeat"}"#).unwrap();
        assert_eq!(cmd.kind, CommandKind::Heartbeat);
        assert!(cmd.data.is_empty());
        assert!(cmd.client_id.is_none());
        assert!(!cmd.timestamp.is_empty());
    }

    #[test]
    fn test_parse_null_fields_default() {
        let cmd = CommandEnvelope::parse(
            r#"{"type": "get_full_status", "data": null, "client_id": null, "timestamp": null}"#,
        )
        .unwrap();
        assert_eq!(cmd.kind, CommandKind::GetFullStatus);
        assert!(cmd.data.is_empty());
        assert!(!cmd.timestamp.is_empty());
    }

    #[test]
    fn test_parse_ignores_unknown_fields() {
        let cmd =
            CommandEnvelope::parse(r#"{"type": "connect", "action": "whatever", "extra": 1}"#)
                .unwrap();
        assert_eq!(cmd.kind, CommandKind::Connect);
    }

    #[test]
    fn test_parse_malformed_json() {
        let err = CommandEnvelope::parse("{not json").unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidFormat(_)));
        assert_eq!(err.to_string(), "Invalid format");
    }

    #[test]
    fn test_parse_unknown_kind() {
        let err = CommandEnvelope::parse(r#"{"type": "bogus_command"}"#).unwrap_err();
        match err {
            ProtocolError::InvalidCommand(message) => {
                assert!(message.contains("bogus_command"));
            }
            other => panic!("Expected InvalidCommand, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_missing_type() {
        let err = CommandEnvelope::parse(r#"{"data": {}}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidCommand(_)));
    }

    #[test]
    fn test_round_trip_preserves_fields() {
        let original = CommandEnvelope::new(CommandKind::UpdateInterval)
            .with("value", 2.5)
            .client_id("tablet-1");

        let parsed = CommandEnvelope::parse(&original.to_json().unwrap()).unwrap();
        assert_eq!(parsed.kind, original.kind);
        assert_eq!(parsed.data, original.data);
        assert_eq!(parsed.client_id, original.client_id);
    }

    #[test]
    fn test_kind_wire_names_match_serde() {
        for kind in [
            CommandKind::InitCamera,
            CommandKind::SetDisplayWindow,
            CommandKind::GetDiagnosticInfo,
            CommandKind::UpdateInterval,
        ] {
            assert_eq!(serde_json::to_value(kind).unwrap(), json!(kind.as_str()));
        }
    }

    #[test]
    fn test_argument_accessors() {
        let cmd = CommandEnvelope::new(CommandKind::SetDisplayWindow)
            .with("enabled", true)
            .with("value", 3);
        assert_eq!(cmd.flag("enabled"), Some(true));
        assert_eq!(cmd.number("value"), Some(3.0));
        assert_eq!(cmd.number("missing"), None);
    }
}
