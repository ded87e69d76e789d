//! Device collaborators
//!
//! The control plane reads telemetry and drives the camera through two
//! narrow traits, so the dispatcher and broadcaster can be exercised with
//! fakes and the host-specific parts stay in one place.

mod camera;
mod host;

pub use camera::RelayCamera;
pub use host::HostMetrics;

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;
use thiserror::Error;

use crate::frame::Frame;

/// JSON object produced by a collaborator
pub type Telemetry = Map<String, Value>;

/// Failure reported by a collaborator
#[derive(Debug, Error)]
pub enum CollaboratorError {
    /// The resource is missing on this host
    #[error("{0} unavailable")]
    Unavailable(String),

    /// The operation ran and failed
    #[error("{0}")]
    Failed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Source of system telemetry
#[async_trait]
pub trait MetricsSource: Send + Sync {
    /// Compact status: health score, uptime, load
    async fn basic_status(&self) -> Result<Telemetry, CollaboratorError>;

    /// CPU, memory and temperature detail
    async fn health_metrics(&self) -> Result<Telemetry, CollaboratorError>;

    /// Platform and build information
    async fn diagnostic_info(&self) -> Result<Telemetry, CollaboratorError>;
}

/// Camera control surface used by the dispatcher and broadcaster
#[async_trait]
pub trait CameraControl: Send + Sync {
    /// Prepare the camera. `Ok(false)` means it could not be opened.
    async fn init(&self) -> Result<bool, CollaboratorError>;

    fn is_initialized(&self) -> bool;

    /// Begin streaming. `Ok(false)` means it was already streaming.
    async fn start(&self) -> Result<bool, CollaboratorError>;

    /// Stop streaming. Stopping an idle camera is not an error.
    async fn stop(&self) -> Result<(), CollaboratorError>;

    async fn status(&self) -> Result<Telemetry, CollaboratorError>;

    /// Latest frame while streaming. Never waits for a new frame.
    async fn latest_frame(&self) -> Option<Arc<Frame>>;

    fn is_streaming(&self) -> bool;

    async fn set_display_window(&self, enabled: bool) -> Result<(), CollaboratorError>;
}
