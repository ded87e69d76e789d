//! Data Transfer Objects
//!
//! Request and response types for the HTTP endpoints.

use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::links::{ConnectionSummary, TransportKind};
use crate::session::SessionInfo;

// ============================================
// LINK DTOs
// ============================================

/// Link creation request
///
/// Fields are optional so a missing one is reported as a validation error
/// rather than a body rejection.
#[derive(Debug, Default, Deserialize)]
pub struct CreateLinkRequest {
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub transport: Option<TransportKind>,
}

/// Validated link creation request
#[derive(Debug, Clone, PartialEq)]
pub struct LinkRequest {
    pub device_id: String,
    pub address: String,
    pub transport: TransportKind,
}

impl CreateLinkRequest {
    pub fn validate(self) -> Result<LinkRequest, ApiError> {
        let present = |field: Option<String>| field.filter(|v| !v.trim().is_empty());
        match (present(self.device_id), present(self.address)) {
            (Some(device_id), Some(address)) => Ok(LinkRequest {
                device_id,
                address,
                transport: self.transport.unwrap_or_default(),
            }),
            _ => Err(ApiError::Validation("Missing required fields".to_string())),
        }
    }
}

/// Single link response
#[derive(Debug, Serialize)]
pub struct LinkResponse {
    pub status: String,
    pub connection: ConnectionSummary,
}

/// Link list response
#[derive(Debug, Serialize)]
pub struct LinkListResponse {
    pub links: Vec<ConnectionSummary>,
    pub total: usize,
    pub active: usize,
}

// ============================================
// SESSION DTOs
// ============================================

/// Connected sessions by role
#[derive(Debug, Serialize)]
pub struct SessionListResponse {
    pub controllers: Vec<SessionInfo>,
    pub producers: Vec<SessionInfo>,
    pub total: usize,
}

// ============================================
// HEALTH DTOs
// ============================================

/// Full health response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Overall status: "healthy" or "shutting_down"
    pub status: String,
    pub uptime_seconds: u64,
    /// Connected controller sessions
    pub controllers: usize,
    /// Connected producer sessions
    pub producers: usize,
    pub broadcast_interval_secs: f64,
    pub frames_relayed: u64,
    pub active_links: usize,
    pub version: String,
}
