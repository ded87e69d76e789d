//! Managed links
//!
//! Outbound connections to companion devices (a workstation, a relay box),
//! each tracked by a small lifecycle state machine with a retry budget.

mod connection;
mod connector;
mod manager;

pub use connection::{
    Connection, ConnectionState, ConnectionSummary, TransportKind, DEFAULT_MAX_RETRIES,
};
pub use connector::{LinkConnector, LinkTarget, TcpConnector};
pub use manager::LinkManager;

use thiserror::Error;
use uuid::Uuid;

/// Link errors
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("Invalid link address: {0:?}")]
    InvalidAddress(String),

    #[error("Connection to {address} timed out after {secs}s")]
    Timeout { address: String, secs: u64 },

    #[error("Cannot reach {address}: {source}")]
    Unreachable {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Link to {device_id} failed after {attempts} attempts: {last_error}")]
    Exhausted {
        device_id: String,
        attempts: u32,
        last_error: String,
    },

    #[error("Link not found: {0}")]
    NotFound(Uuid),
}
