//! Response envelopes sent to controllers

use serde::{Deserialize, Serialize};

use super::{timestamp_now, Payload};

/// Kind of a server → client envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseKind {
    Success,
    Error,
    ConnectionStatus,
    HeartbeatAck,
    CameraFrame,
    SystemStatus,
    CommandResponse,
}

/// Outcome carried by every response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Success,
    Error,
}

/// A response or push sent to a controller.
///
/// An error envelope always carries a non-empty message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    #[serde(rename = "type")]
    pub kind: ResponseKind,
    pub status: ResponseStatus,
    pub message: String,
    #[serde(default)]
    pub data: Payload,
    #[serde(default)]
    pub client_id: Option<String>,
    pub timestamp: String,
}

impl ResponseEnvelope {
    /// Successful response of the given kind
    pub fn success(kind: ResponseKind, message: impl Into<String>, data: Payload) -> Self {
        Self {
            kind,
            status: ResponseStatus::Success,
            message: message.into(),
            data,
            client_id: None,
            timestamp: timestamp_now(),
        }
    }

    /// Error response
    pub fn error(message: impl Into<String>) -> Self {
        let mut message = message.into();
        if message.trim().is_empty() {
            message = "Unknown error".to_string();
        }

        Self {
            kind: ResponseKind::Error,
            status: ResponseStatus::Error,
            message,
            data: Payload::new(),
            client_id: None,
            timestamp: timestamp_now(),
        }
    }

    /// Acknowledge a heartbeat with the current server time
    pub fn heartbeat_ack() -> Self {
        let now = timestamp_now();
        let mut data = Payload::new();
        data.insert("timestamp".to_string(), now.clone().into());

        Self {
            kind: ResponseKind::HeartbeatAck,
            status: ResponseStatus::Success,
            message: "Heartbeat acknowledged".to_string(),
            data,
            client_id: None,
            timestamp: now,
        }
    }

    /// Set the client id echoed back to the caller
    pub fn with_client_id(mut self, client_id: Option<String>) -> Self {
        self.client_id = client_id;
        self
    }

    /// Whether this envelope reports a failure
    pub fn is_error(&self) -> bool {
        self.status == ResponseStatus::Error
    }

    /// Encode as JSON text
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
