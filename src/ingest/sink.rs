//! Frame sinks
//!
//! Where decoded frames go, selected by the configured display mode.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use super::relay::FrameRelay;
use crate::config::DisplayMode;
use crate::frame::Frame;

/// Failure to hand a frame to its destination
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Failed to write frame to {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Destination for decoded frames
#[async_trait]
pub trait FrameSink: Send + Sync {
    /// Short name for logs and health output
    fn name(&self) -> &'static str;

    /// Consume one frame
    async fn accept(&self, frame: Arc<Frame>) -> Result<(), SinkError>;
}

/// Writes each frame to its own file
#[derive(Debug)]
pub struct SaveSink {
    dir: PathBuf,
}

impl SaveSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `frame_{n}_{YYYYmmdd_HHMMSS_micros}.{ext}`
    pub fn file_name(frame: &Frame) -> String {
        format!(
            "frame_{}_{}.{}",
            frame.frame_number,
            frame.captured_at.format("%Y%m%d_%H%M%S_%6f"),
            frame.format.extension()
        )
    }
}

#[async_trait]
impl FrameSink for SaveSink {
    fn name(&self) -> &'static str {
        "save"
    }

    async fn accept(&self, frame: Arc<Frame>) -> Result<(), SinkError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| SinkError::Io {
                path: self.dir.clone(),
                source,
            })?;

        let path = self.dir.join(Self::file_name(&frame));
        tokio::fs::write(&path, &frame.data)
            .await
            .map_err(|source| SinkError::Io {
                path: path.clone(),
                source,
            })?;

        tracing::debug!(frame_number = frame.frame_number, path = ?path, "Frame saved");
        Ok(())
    }
}

/// Publishes frames to the relay for controllers to receive
#[derive(Debug)]
pub struct RelaySink {
    relay: Arc<FrameRelay>,
}

impl RelaySink {
    pub fn new(relay: Arc<FrameRelay>) -> Self {
        Self { relay }
    }
}

#[async_trait]
impl FrameSink for RelaySink {
    fn name(&self) -> &'static str {
        "window"
    }

    async fn accept(&self, frame: Arc<Frame>) -> Result<(), SinkError> {
        self.relay.publish(frame).await;
        Ok(())
    }
}

/// Acknowledges and drops frames
#[derive(Debug, Default)]
pub struct DiscardSink;

#[async_trait]
impl FrameSink for DiscardSink {
    fn name(&self) -> &'static str {
        "none"
    }

    async fn accept(&self, _frame: Arc<Frame>) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Build the sink for a display mode
pub fn build_sink(mode: DisplayMode, save_dir: &Path, relay: Arc<FrameRelay>) -> Arc<dyn FrameSink> {
    match mode {
        DisplayMode::Save => Arc::new(SaveSink::new(save_dir)),
        DisplayMode::Window => Arc::new(RelaySink::new(relay)),
        DisplayMode::None => Arc::new(DiscardSink),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::ImageFormat;
    use chrono::{TimeZone, Utc};
    use tempfile::tempdir;

    fn frame(n: u64) -> Arc<Frame> {
        Arc::new(Frame {
            frame_number: n,
            captured_at: Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap(),
            format: ImageFormat::Jpeg,
            width: Some(2),
            height: Some(2),
            data: vec![0xFF, 0xD8, 0xFF, 0xD9],
        })
    }

    #[test]
    fn test_file_name_pattern() {
        assert_eq!(SaveSink::file_name(&frame(12)), "frame_12_20240309_140507_000000.jpg");
    }

    #[tokio::test]
    async fn test_save_sink_writes_file() {
        let dir = tempdir().unwrap();
        let sink = SaveSink::new(dir.path().join("frames"));

        sink.accept(frame(1)).await.unwrap();

        let path = sink.dir().join(SaveSink::file_name(&frame(1)));
        let written = std::fs::read(path).unwrap();
        assert_eq!(written, vec![0xFF, 0xD8, 0xFF, 0xD9]);
    }

    #[tokio::test]
    async fn test_save_sink_reports_io_error() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"file").unwrap();

        let sink = SaveSink::new(&blocker);
        let err = sink.accept(frame(1)).await.unwrap_err();
        assert!(matches!(err, SinkError::Io { .. }));
    }

    #[tokio::test]
    async fn test_build_sink_by_mode() {
        let relay = Arc::new(FrameRelay::new());
        let dir = Path::new("frames");

        assert_eq!(build_sink(DisplayMode::Save, dir, Arc::clone(&relay)).name(), "save");
        assert_eq!(build_sink(DisplayMode::None, dir, Arc::clone(&relay)).name(), "none");

        let window = build_sink(DisplayMode::Window, dir, Arc::clone(&relay));
        window.accept(frame(5)).await.unwrap();
        assert_eq!(relay.latest().await.unwrap().frame_number, 5);
    }
}
