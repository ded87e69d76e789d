//! Frame relay
//!
//! Hand-off point between producers and the broadcast scheduler. Holds only
//! the most recent frame; readers never wait on producers.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::frame::Frame;

/// Latest-frame slot shared by producers and the camera
#[derive(Debug, Default)]
pub struct FrameRelay {
    latest: RwLock<Option<Arc<Frame>>>,
    producers: AtomicUsize,
    frames_relayed: AtomicU64,
}

impl FrameRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the latest frame
    pub async fn publish(&self, frame: Arc<Frame>) {
        *self.latest.write().await = Some(frame);
        self.frames_relayed.fetch_add(1, Ordering::Relaxed);
    }

    /// Most recent frame, if any producer has sent one
    pub async fn latest(&self) -> Option<Arc<Frame>> {
        self.latest.read().await.clone()
    }

    /// Drop the held frame
    pub async fn clear(&self) {
        *self.latest.write().await = None;
    }

    /// Record a connected producer until the guard is dropped
    pub fn attach_producer(self: &Arc<Self>) -> ProducerGuard {
        let attached = self.producers.fetch_add(1, Ordering::AcqRel) + 1;
        tracing::debug!(producers = attached, "Producer attached to relay");
        ProducerGuard {
            relay: Arc::clone(self),
        }
    }

    pub fn producer_count(&self) -> usize {
        self.producers.load(Ordering::Acquire)
    }

    pub fn has_producer(&self) -> bool {
        self.producer_count() > 0
    }

    /// Total frames published since startup
    pub fn frames_relayed(&self) -> u64 {
        self.frames_relayed.load(Ordering::Relaxed)
    }
}

/// Keeps a producer counted as attached while alive
#[derive(Debug)]
pub struct ProducerGuard {
    relay: Arc<FrameRelay>,
}

impl Drop for ProducerGuard {
    fn drop(&mut self) {
        let remaining = self.relay.producers.fetch_sub(1, Ordering::AcqRel) - 1;
        tracing::debug!(producers = remaining, "Producer detached from relay");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::ImageFormat;
    use chrono::Utc;

    fn frame(n: u64) -> Arc<Frame> {
        Arc::new(Frame {
            frame_number: n,
            captured_at: Utc::now(),
            format: ImageFormat::Jpeg,
            width: None,
            height: None,
            data: vec![0xFF, 0xD8, 0xFF],
        })
    }

    #[tokio::test]
    async fn test_latest_frame_wins() {
        let relay = FrameRelay::new();
        assert!(relay.latest().await.is_none());

        relay.publish(frame(1)).await;
        relay.publish(frame(2)).await;

        assert_eq!(relay.latest().await.unwrap().frame_number, 2);
        assert_eq!(relay.frames_relayed(), 2);

        relay.clear().await;
        assert!(relay.latest().await.is_none());
    }

    #[test]
    fn test_producer_guard_counts() {
        let relay = Arc::new(FrameRelay::new());
        let first = relay.attach_producer();
        let second = relay.attach_producer();
        assert_eq!(relay.producer_count(), 2);

        drop(first);
        assert!(relay.has_producer());
        drop(second);
        assert!(!relay.has_producer());
    }
}
