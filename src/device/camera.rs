//! Camera backed by the frame relay
//!
//! The camera itself lives on a producer that pushes frames to `/ingest`.
//! This control only tracks streaming state and exposes the relay's latest
//! frame while streaming is on.

use async_trait::async_trait;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::{CameraControl, CollaboratorError, Telemetry};
use crate::frame::Frame;
use crate::ingest::FrameRelay;
use crate::protocol::{into_payload, timestamp_now};

/// Camera control over a [`FrameRelay`]
#[derive(Debug)]
pub struct RelayCamera {
    relay: Arc<FrameRelay>,
    url: Option<String>,
    initialized: AtomicBool,
    streaming: AtomicBool,
    display_window: AtomicBool,
}

impl RelayCamera {
    pub fn new(relay: Arc<FrameRelay>, url: Option<String>) -> Self {
        Self {
            relay,
            url,
            initialized: AtomicBool::new(false),
            streaming: AtomicBool::new(false),
            display_window: AtomicBool::new(false),
        }
    }

}

#[async_trait]
impl CameraControl for RelayCamera {
    async fn init(&self) -> Result<bool, CollaboratorError> {
        if !self.initialized.swap(true, Ordering::AcqRel) {
            tracing::info!(url = ?self.url, "Camera initialized");
        }
        Ok(true)
    }

    fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    async fn start(&self) -> Result<bool, CollaboratorError> {
        if !self.is_initialized() && !self.init().await? {
            return Ok(false);
        }
        if !self.relay.has_producer() {
            tracing::warn!("Start requested with no frame producer connected");
            return Err(CollaboratorError::Unavailable("frame producer".to_string()));
        }
        if self.streaming.swap(true, Ordering::AcqRel) {
            return Ok(false);
        }

        tracing::info!("Camera streaming started");
        Ok(true)
    }

    async fn stop(&self) -> Result<(), CollaboratorError> {
        if !self.streaming.swap(false, Ordering::AcqRel) {
            tracing::debug!("Stop requested while idle");
            return Ok(());
        }
        self.relay.clear().await;

        tracing::info!("Camera streaming stopped");
        Ok(())
    }

    async fn status(&self) -> Result<Telemetry, CollaboratorError> {
        let latest = self.relay.latest().await;
        Ok(into_payload(json!({
            "is_initialized": self.is_initialized(),
            "is_streaming": self.is_streaming(),
            "is_connected": self.relay.has_producer(),
            "display_window": self.display_window.load(Ordering::Acquire),
            "camera_url": self.url,
            "producers": self.relay.producer_count(),
            "frames_relayed": self.relay.frames_relayed(),
            "latest_frame_number": latest.map(|f| f.frame_number),
            "timestamp": timestamp_now(),
        })))
    }

    async fn latest_frame(&self) -> Option<Arc<Frame>> {
        if !self.is_streaming() {
            return None;
        }
        self.relay.latest().await
    }

    fn is_streaming(&self) -> bool {
        self.streaming.load(Ordering::Acquire)
    }

    async fn set_display_window(&self, enabled: bool) -> Result<(), CollaboratorError> {
        self.display_window.store(enabled, Ordering::Release);
        tracing::debug!(enabled, "Display window toggled");
        Ok(())
    }
}
