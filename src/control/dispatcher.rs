//! Command Dispatcher
//!
//! Routes each controller command to its handler and queues exactly one
//! response on the originating session.

use serde_json::{json, Value};
use std::sync::Arc;

use super::broadcast::{degrade, BroadcastInterval, IntervalError};
use crate::device::{CameraControl, MetricsSource};
use crate::protocol::{
    into_payload, CommandEnvelope, CommandKind, Payload, ResponseEnvelope, ResponseKind,
};
use crate::session::{Flow, Session};

const CAMERA_UNAVAILABLE: &str = "camera not available";

/// Handles controller commands
pub struct CommandDispatcher {
    metrics: Arc<dyn MetricsSource>,
    camera: Option<Arc<dyn CameraControl>>,
    interval: BroadcastInterval,
}

impl CommandDispatcher {
    pub fn new(
        metrics: Arc<dyn MetricsSource>,
        camera: Option<Arc<dyn CameraControl>>,
        interval: BroadcastInterval,
    ) -> Self {
        Self {
            metrics,
            camera,
            interval,
        }
    }

    /// Handle one raw text message from `session`.
    ///
    /// The response is queued on the session. Returns [`Flow::Close`] once
    /// the client asked to disconnect.
    pub async fn dispatch(&self, session: &Session, raw: &str) -> Flow {
        let (response, flow) = match CommandEnvelope::parse(raw) {
            Ok(command) => {
                tracing::debug!(session_id = %session.id(), command = %command.kind, "Command received");
                let flow = match command.kind {
                    CommandKind::Disconnect => Flow::Close,
                    _ => Flow::Continue,
                };
                let response = self
                    .handle(&command)
                    .await
                    .with_client_id(command.client_id.clone());
                (response, flow)
            }
            Err(e) => {
                tracing::warn!(session_id = %session.id(), error = %e, "Rejected command");
                (ResponseEnvelope::error(e.to_string()), Flow::Continue)
            }
        };

        let response = match response.client_id {
            Some(_) => response,
            None => response.with_client_id(Some(session.id().to_string())),
        };

        if let Err(e) = session.send_json(&response).await {
            tracing::debug!(session_id = %session.id(), error = %e, "Response not delivered");
        }
        flow
    }

    /// Produce the response for a parsed command
    pub async fn handle(&self, command: &CommandEnvelope) -> ResponseEnvelope {
        match command.kind {
            CommandKind::Heartbeat => ResponseEnvelope::heartbeat_ack(),
            CommandKind::Connect => ResponseEnvelope::success(
                ResponseKind::ConnectionStatus,
                "Connected successfully",
                Payload::new(),
            ),
            CommandKind::Disconnect => ResponseEnvelope::success(
                ResponseKind::ConnectionStatus,
                "Disconnected successfully",
                Payload::new(),
            ),
            CommandKind::InitCamera => self.init_camera().await,
            CommandKind::StartStreaming => self.start_streaming().await,
            CommandKind::StopStreaming => self.stop_streaming().await,
            CommandKind::GetCameraStatus => self.camera_status().await,
            CommandKind::SetDisplayWindow => {
                self.set_display_window(command.flag("enabled").unwrap_or(false))
                    .await
            }
            CommandKind::GetFullStatus => self.full_status().await,
            CommandKind::GetBasicStatus => telemetry_response(
                "Basic status",
                self.metrics.basic_status().await,
            ),
            CommandKind::GetHealthMetrics => telemetry_response(
                "Health metrics",
                self.metrics.health_metrics().await,
            ),
            CommandKind::GetDiagnosticInfo => telemetry_response(
                "Diagnostic info",
                self.metrics.diagnostic_info().await,
            ),
            CommandKind::UpdateInterval => self.update_interval(command),
        }
    }

    fn camera(&self) -> Result<&Arc<dyn CameraControl>, ResponseEnvelope> {
        self.camera
            .as_ref()
            .ok_or_else(|| ResponseEnvelope::error(CAMERA_UNAVAILABLE))
    }

    async fn init_camera(&self) -> ResponseEnvelope {
        let camera = match self.camera() {
            Ok(camera) => camera,
            Err(response) => return response,
        };

        match camera.init().await {
            Ok(true) => {
                let status = camera.status().await.unwrap_or_default();
                ResponseEnvelope::success(
                    ResponseKind::Success,
                    "Camera initialized successfully",
                    status,
                )
            }
            Ok(false) => ResponseEnvelope::error("Failed to initialize camera"),
            Err(e) => ResponseEnvelope::error(e.to_string()),
        }
    }

    async fn start_streaming(&self) -> ResponseEnvelope {
        let camera = match self.camera() {
            Ok(camera) => camera,
            Err(response) => return response,
        };

        if !camera.is_initialized() {
            tracing::info!("Initializing camera before streaming");
            match camera.init().await {
                Ok(true) => {}
                Ok(false) => return ResponseEnvelope::error("Failed to initialize camera"),
                Err(e) => return ResponseEnvelope::error(e.to_string()),
            }
        }

        match camera.start().await {
            Ok(true) => {
                let status = camera.status().await.unwrap_or_default();
                ResponseEnvelope::success(ResponseKind::Success, "Streaming started", status)
            }
            Ok(false) => ResponseEnvelope::error("Failed to start streaming"),
            Err(e) => ResponseEnvelope::error(e.to_string()),
        }
    }

    async fn stop_streaming(&self) -> ResponseEnvelope {
        let camera = match self.camera() {
            Ok(camera) => camera,
            Err(response) => return response,
        };

        match camera.stop().await {
            Ok(()) => {
                let status = camera.status().await.unwrap_or_default();
                ResponseEnvelope::success(ResponseKind::Success, "Streaming stopped", status)
            }
            Err(e) => ResponseEnvelope::error(e.to_string()),
        }
    }

    async fn camera_status(&self) -> ResponseEnvelope {
        let camera = match self.camera() {
            Ok(camera) => camera,
            Err(response) => return response,
        };
        telemetry_response("Camera status", camera.status().await)
    }

    async fn set_display_window(&self, enabled: bool) -> ResponseEnvelope {
        let camera = match self.camera() {
            Ok(camera) => camera,
            Err(response) => return response,
        };

        match camera.set_display_window(enabled).await {
            Ok(()) => ResponseEnvelope::success(
                ResponseKind::Success,
                format!("Display window {}", if enabled { "enabled" } else { "disabled" }),
                into_payload(json!({ "display_window": enabled })),
            ),
            Err(e) => ResponseEnvelope::error(e.to_string()),
        }
    }

    async fn full_status(&self) -> ResponseEnvelope {
        let camera = async {
            match &self.camera {
                Some(camera) => degrade("camera", camera.status().await),
                None => Value::Null,
            }
        };
        let (basic, health, diagnostic, camera) = tokio::join!(
            self.metrics.basic_status(),
            self.metrics.health_metrics(),
            self.metrics.diagnostic_info(),
            camera,
        );

        let mut data = Payload::new();
        data.insert("basic_status".to_string(), degrade("basic_status", basic));
        data.insert("health_metrics".to_string(), degrade("health_metrics", health));
        data.insert("diagnostic_info".to_string(), degrade("diagnostic_info", diagnostic));
        data.insert("camera".to_string(), camera);

        ResponseEnvelope::success(ResponseKind::SystemStatus, "Full system status", data)
    }

    fn update_interval(&self, command: &CommandEnvelope) -> ResponseEnvelope {
        let requested = command
            .data
            .get("value")
            .or_else(|| command.data.get("interval"));

        let result = match requested {
            None | Some(Value::Null) => Err(IntervalError::Missing),
            Some(value) => match value.as_f64() {
                Some(secs) => self.interval.set_secs(secs),
                None => {
                    return ResponseEnvelope::error(format!(
                        "Interval must be a number of seconds, got {}",
                        value
                    ))
                }
            },
        };

        match result {
            Ok(period) => ResponseEnvelope::success(
                ResponseKind::Success,
                "Broadcast interval updated",
                into_payload(json!({ "interval": period.as_secs_f64() })),
            ),
            Err(e) => ResponseEnvelope::error(e.to_string()),
        }
    }
}

fn telemetry_response(
    label: &str,
    result: Result<crate::device::Telemetry, crate::device::CollaboratorError>,
) -> ResponseEnvelope {
    match result {
        Ok(data) => ResponseEnvelope::success(ResponseKind::SystemStatus, label, data),
        Err(e) => ResponseEnvelope::error(format!("{} failed: {}", label, e)),
    }
}
