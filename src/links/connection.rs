//! Lifecycle of one managed link
//!
//! ```text
//! CONNECTING ──▶ CONNECTED ──▶ DISCONNECTED
//!     │              │
//!     ├──▶ FAILED ◀──┤
//!     └──▶ TIMEOUT ◀─┘
//! ```
//!
//! Every state can move back to CONNECTING while retries remain.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Connection attempts allowed before a link is given up
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Health of a link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Timeout,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Failed => "failed",
            ConnectionState::Timeout => "timeout",
        }
    }
}

/// How a link reaches its device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    #[default]
    Tcp,
    #[serde(rename = "websocket")]
    WebSocket,
}

/// A managed link and its retry budget.
///
/// State only changes through [`Connection::update_status`], which also
/// stamps `last_seen`.
#[derive(Debug, Clone)]
pub struct Connection {
    connection_id: Uuid,
    device_id: String,
    address: String,
    transport: TransportKind,
    state: ConnectionState,
    device_name: Option<String>,
    last_seen: DateTime<Utc>,
    error: Option<String>,
    retry_count: u32,
    max_retries: u32,
}

/// Serializable view of a connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionSummary {
    pub connection_id: Uuid,
    pub device_id: String,
    pub address: String,
    pub transport: TransportKind,
    pub state: ConnectionState,
    pub active: bool,
    pub device_name: Option<String>,
    pub last_seen: DateTime<Utc>,
    pub error: Option<String>,
    pub retry_count: u32,
    pub max_retries: u32,
}

impl Connection {
    /// New link in the CONNECTING state
    pub fn new(
        device_id: impl Into<String>,
        address: impl Into<String>,
        transport: TransportKind,
    ) -> Self {
        Self {
            connection_id: Uuid::new_v4(),
            device_id: device_id.into(),
            address: address.into(),
            transport,
            state: ConnectionState::Connecting,
            device_name: None,
            last_seen: Utc::now(),
            error: None,
            retry_count: 0,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self.retry_count = self.retry_count.min(max_retries);
        self
    }

    pub fn connection_id(&self) -> Uuid {
        self.connection_id
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn transport(&self) -> TransportKind {
        self.transport
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn last_seen(&self) -> DateTime<Utc> {
        self.last_seen
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Move to `state`, replacing the last error
    pub fn update_status(&mut self, state: ConnectionState, error: Option<String>) {
        self.state = state;
        self.error = error;
        self.last_seen = Utc::now();
    }

    pub fn is_active(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }

    /// Count a failed attempt. Returns whether another attempt is allowed.
    pub fn increment_retry(&mut self) -> bool {
        if self.retry_count < self.max_retries {
            self.retry_count += 1;
        }
        self.can_retry()
    }

    pub fn reset_retries(&mut self) {
        self.retry_count = 0;
    }

    /// Record the name the remote end identified itself with
    pub fn identify(&mut self, device_name: impl Into<String>) {
        self.device_name = Some(device_name.into());
    }

    pub fn summary(&self) -> ConnectionSummary {
        ConnectionSummary {
            connection_id: self.connection_id,
            device_id: self.device_id.clone(),
            address: self.address.clone(),
            transport: self.transport,
            state: self.state,
            active: self.is_active(),
            device_name: self.device_name.clone(),
            last_seen: self.last_seen,
            error: self.error.clone(),
            retry_count: self.retry_count,
            max_retries: self.max_retries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_connection_is_connecting() {
        let conn = Connection::new("pc-1", "10.0.0.5:22", TransportKind::Tcp);
        assert_eq!(conn.state(), ConnectionState::Connecting);
        assert!(!conn.is_active());
        assert!(conn.can_retry());
        assert_eq!(conn.retry_count(), 0);
    }

    #[test]
    fn test_update_status_stamps_last_seen() {
        let mut conn = Connection::new("pc-1", "10.0.0.5:22", TransportKind::Tcp);
        let before = conn.last_seen();

        conn.update_status(ConnectionState::Failed, Some("refused".to_string()));
        assert_eq!(conn.state(), ConnectionState::Failed);
        assert_eq!(conn.error(), Some("refused"));
        assert!(conn.last_seen() >= before);

        conn.update_status(ConnectionState::Connected, None);
        assert!(conn.is_active());
        assert!(conn.error().is_none());
    }

    #[test]
    fn test_retry_counter_saturates() {
        let mut conn = Connection::new("pc-1", "10.0.0.5:22", TransportKind::Tcp);

        assert!(conn.increment_retry());
        assert!(conn.increment_retry());
        assert!(!conn.increment_retry());
        assert!(!conn.increment_retry());
        assert_eq!(conn.retry_count(), DEFAULT_MAX_RETRIES);

        conn.reset_retries();
        assert!(conn.can_retry());
    }

    #[test]
    fn test_zero_retry_budget() {
        let mut conn =
            Connection::new("pc-1", "10.0.0.5:22", TransportKind::Tcp).with_max_retries(0);
        assert!(!conn.can_retry());
        assert!(!conn.increment_retry());
        assert_eq!(conn.retry_count(), 0);
    }

    #[test]
    fn test_summary_serializes_lowercase_state() {
        let mut conn = Connection::new("pc-1", "ws://10.0.0.5:9000", TransportKind::WebSocket);
        conn.identify("workstation");
        conn.update_status(ConnectionState::Timeout, Some("timed out".to_string()));

        let value = serde_json::to_value(conn.summary()).unwrap();
        assert_eq!(value["state"], "timeout");
        assert_eq!(value["transport"], "websocket");
        assert_eq!(value["device_name"], "workstation");
        assert_eq!(value["active"], false);
    }
}
