//! Per-producer frame pipeline
//!
//! Turns each inbound message into at most one reply. The frame counter
//! advances for every message that carries an image, decoded or not, so
//! acknowledged frame numbers let a producer spot frames the server rejected.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;

use super::decode::{decode_base64, decode_frame, DecodeError};
use super::sink::{FrameSink, SinkError};
use crate::session::Inbound;

/// Reply sent to a producer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IngestReply {
    /// Sent once on connect
    Ready { message: String },
    /// A frame was decoded and handed to the sink
    FrameAck { frame_number: u64, timestamp: f64 },
    HeartbeatAck { timestamp: f64 },
    Error { message: String },
}

impl IngestReply {
    pub fn ready() -> Self {
        IngestReply::Ready {
            message: "Server ready for frames".to_string(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        IngestReply::Error {
            message: message.into(),
        }
    }
}

/// Why a frame was not acknowledged
#[derive(Debug, thiserror::Error)]
enum FrameError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Sink(#[from] SinkError),
}

/// Frame pipeline state for one producer session
pub struct FramePipeline {
    sink: Arc<dyn FrameSink>,
    frame_count: u64,
    last_frame_at: Option<Instant>,
}

impl FramePipeline {
    pub fn new(sink: Arc<dyn FrameSink>) -> Self {
        Self {
            sink,
            frame_count: 0,
            last_frame_at: None,
        }
    }

    /// Number of image-bearing messages seen so far
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Process one message. `None` means no reply is sent.
    pub async fn process(&mut self, message: Inbound) -> Option<IngestReply> {
        match message {
            Inbound::Binary(bytes) => {
                if bytes.is_empty() {
                    tracing::warn!("Received empty message");
                    return None;
                }
                Some(self.ingest(Ok(bytes)).await)
            }
            Inbound::Text(text) => {
                if text.trim().is_empty() {
                    tracing::warn!("Received empty message");
                    return None;
                }
                Some(self.process_text(&text).await)
            }
        }
    }

    async fn process_text(&mut self, text: &str) -> IngestReply {
        let value: Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(error = %e, "JSON decode error");
                return IngestReply::error("Invalid format");
            }
        };

        let Some(object) = value.as_object() else {
            return IngestReply::error("Unsupported message");
        };

        let kind = object.get("type").and_then(Value::as_str).unwrap_or("image");
        if kind == "heartbeat" {
            tracing::debug!("Received heartbeat");
            return IngestReply::HeartbeatAck {
                timestamp: epoch_seconds(),
            };
        }

        match object.get("image") {
            Some(Value::String(encoded)) => {
                let bytes = decode_base64(encoded);
                self.ingest(bytes).await
            }
            Some(_) => self.ingest(Err(DecodeError::InvalidPayload)).await,
            None => {
                tracing::debug!(kind, "Message carries no image");
                IngestReply::error("Unsupported message")
            }
        }
    }

    async fn ingest(&mut self, bytes: Result<Vec<u8>, DecodeError>) -> IngestReply {
        self.frame_count += 1;
        let frame_number = self.frame_count;

        let now = Instant::now();
        if let Some(previous) = self.last_frame_at.replace(now) {
            tracing::debug!(
                frame_number,
                interval_ms = now.duration_since(previous).as_millis() as u64,
                "Processing frame"
            );
        }

        match self.deliver(bytes, frame_number).await {
            Ok(()) => IngestReply::FrameAck {
                frame_number,
                timestamp: epoch_seconds(),
            },
            Err(e) => {
                tracing::error!(frame_number, error = %e, "Frame processing error");
                IngestReply::error(format!("Frame processing error: {}", e))
            }
        }
    }

    async fn deliver(
        &self,
        bytes: Result<Vec<u8>, DecodeError>,
        frame_number: u64,
    ) -> Result<(), FrameError> {
        let frame = decode_frame(bytes?, frame_number)?;
        tracing::debug!(
            frame_number,
            format = %frame.format,
            size = frame.len(),
            "Frame decoded"
        );
        self.sink.accept(Arc::new(frame)).await?;
        Ok(())
    }
}

/// Seconds since the Unix epoch, with sub-second precision
fn epoch_seconds() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}
