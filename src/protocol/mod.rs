//! Control Protocol
//!
//! JSON envelopes exchanged with controllers over the `/ws` endpoint.
//!
//! ## Wire format
//!
//! Commands (client → server):
//!
//! ```json
//! {"type": "update_interval", "data": {"value": 2.5}, "client_id": "tablet-1"}
//! ```
//!
//! Responses and pushes (server → client):
//!
//! ```json
//! {"type": "success", "status": "success", "message": "...", "data": {}, "client_id": "tablet-1", "timestamp": "..."}
//! ```
//!
//! Unknown top-level fields are ignored; missing `data` defaults to `{}` and
//! missing `timestamp` defaults to the time the envelope was parsed.

mod command;
mod response;

pub use command::{CommandEnvelope, CommandKind, ProtocolError};
pub use response::{ResponseEnvelope, ResponseKind, ResponseStatus};

use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};

/// Free-form payload carried by every envelope
pub type Payload = Map<String, Value>;

/// Current server time as an RFC 3339 string
pub fn timestamp_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Turn an arbitrary JSON value into an envelope payload.
///
/// Objects are used as-is; anything else is wrapped as `{"value": ...}`.
pub fn into_payload(value: Value) -> Payload {
    match value {
        Value::Object(map) => map,
        Value::Null => Payload::new(),
        other => {
            let mut map = Payload::new();
            map.insert("value".to_string(), other);
            map
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_into_payload_object_passthrough() {
        let payload = into_payload(json!({"cpu": 12.5}));
        assert_eq!(payload.get("cpu"), Some(&json!(12.5)));
    }

    #[test]
    fn test_into_payload_wraps_scalars() {
        let payload = into_payload(json!(42));
        assert_eq!(payload.get("value"), Some(&json!(42)));
        assert!(into_payload(Value::Null).is_empty());
    }

    #[test]
    fn test_timestamp_is_rfc3339() {
        let ts = timestamp_now();
        assert!(chrono::DateTime::parse_from_rfc3339(&ts).is_ok());
    }
}
