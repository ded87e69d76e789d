//! Collaborator fakes shared by control tests

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::device::{CameraControl, CollaboratorError, MetricsSource, Telemetry};
use crate::frame::{Frame, ImageFormat};
use crate::protocol::into_payload;

/// Metrics source returning fixed values, or failing every call
#[derive(Default)]
pub(crate) struct FakeMetrics {
    pub calls: AtomicUsize,
    pub fail: bool,
}

impl FakeMetrics {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    fn answer(&self, value: serde_json::Value) -> Result<Telemetry, CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(CollaboratorError::Failed("sensor offline".to_string()));
        }
        Ok(into_payload(value))
    }
}

#[async_trait]
impl MetricsSource for FakeMetrics {
    async fn basic_status(&self) -> Result<Telemetry, CollaboratorError> {
        self.answer(json!({"system_health": 91.5}))
    }

    async fn health_metrics(&self) -> Result<Telemetry, CollaboratorError> {
        self.answer(json!({"cpu": {"percent": 12.0}}))
    }

    async fn diagnostic_info(&self) -> Result<Telemetry, CollaboratorError> {
        self.answer(json!({"platform": "test"}))
    }
}

/// Camera with scripted outcomes
pub(crate) struct FakeCamera {
    pub initialized: AtomicBool,
    pub streaming: AtomicBool,
    pub display_window: AtomicBool,
    pub can_init: bool,
    pub can_start: bool,
    pub frame: Option<Arc<Frame>>,
}

impl FakeCamera {
    pub fn new() -> Self {
        Self {
            initialized: AtomicBool::new(false),
            streaming: AtomicBool::new(false),
            display_window: AtomicBool::new(false),
            can_init: true,
            can_start: true,
            frame: None,
        }
    }

    /// Camera that never opens
    pub fn broken() -> Self {
        Self {
            can_init: false,
            ..Self::new()
        }
    }

    pub fn streaming_with_frame(frame_number: u64) -> Self {
        Self {
            streaming: AtomicBool::new(true),
            frame: Some(test_frame(frame_number)),
            ..Self::new()
        }
    }
}

#[async_trait]
impl CameraControl for FakeCamera {
    async fn init(&self) -> Result<bool, CollaboratorError> {
        self.initialized.store(self.can_init, Ordering::SeqCst);
        Ok(self.can_init)
    }

    fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    async fn start(&self) -> Result<bool, CollaboratorError> {
        if !self.can_start {
            return Err(CollaboratorError::Unavailable("frame producer".to_string()));
        }
        Ok(!self.streaming.swap(true, Ordering::SeqCst))
    }

    async fn stop(&self) -> Result<(), CollaboratorError> {
        self.streaming.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn status(&self) -> Result<Telemetry, CollaboratorError> {
        Ok(into_payload(json!({
            "is_initialized": self.is_initialized(),
            "is_streaming": self.is_streaming(),
            "display_window": self.display_window.load(Ordering::SeqCst),
        })))
    }

    async fn latest_frame(&self) -> Option<Arc<Frame>> {
        self.frame.clone()
    }

    fn is_streaming(&self) -> bool {
        self.streaming.load(Ordering::SeqCst)
    }

    async fn set_display_window(&self, enabled: bool) -> Result<(), CollaboratorError> {
        self.display_window.store(enabled, Ordering::SeqCst);
        Ok(())
    }
}

pub(crate) fn test_frame(frame_number: u64) -> Arc<Frame> {
    Arc::new(Frame {
        frame_number,
        captured_at: Utc::now(),
        format: ImageFormat::Jpeg,
        width: Some(2),
        height: Some(2),
        data: vec![0xFF, 0xD8, 0xFF, 0xD9],
    })
}
