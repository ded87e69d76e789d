//! Broadcast Scheduler
//!
//! Pushes a `system_status` envelope to every controller on a fixed period.
//! The payload is built and serialized once per tick and shared by all
//! sessions. Delivery never waits: a session that cannot take the message
//! right now is dropped from the registry and asked to close.

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::config::BroadcastConfig;
use crate::device::{CameraControl, CollaboratorError, MetricsSource, Telemetry};
use crate::protocol::{Payload, ResponseEnvelope, ResponseKind};
use crate::session::{CloseReason, SessionRegistry};

/// Smallest period the scheduler will run at
pub const MIN_INTERVAL_SECS: f64 = 0.1;

#[derive(Debug, Error, PartialEq)]
pub enum IntervalError {
    #[error("Interval must be a positive number of seconds, got {0}")]
    Invalid(f64),

    #[error("Interval value is required")]
    Missing,
}

/// Runtime-adjustable broadcast period.
///
/// Cloned handles share one value; the scheduler is notified of changes.
#[derive(Debug, Clone)]
pub struct BroadcastInterval {
    tx: Arc<watch::Sender<Duration>>,
    min: Duration,
    max: Duration,
}

impl BroadcastInterval {
    pub fn new(initial_secs: f64, min_secs: f64, max_secs: f64) -> Self {
        let min_secs = if min_secs.is_finite() {
            min_secs.max(MIN_INTERVAL_SECS)
        } else {
            MIN_INTERVAL_SECS
        };
        let max_secs = if max_secs.is_finite() {
            max_secs.max(min_secs)
        } else {
            min_secs
        };
        let initial = if initial_secs.is_finite() {
            initial_secs.clamp(min_secs, max_secs)
        } else {
            min_secs
        };

        let (tx, _rx) = watch::channel(Duration::from_secs_f64(initial));
        Self {
            tx: Arc::new(tx),
            min: Duration::from_secs_f64(min_secs),
            max: Duration::from_secs_f64(max_secs),
        }
    }

    pub fn from_config(config: &BroadcastConfig) -> Self {
        Self::new(
            config.interval_secs,
            config.min_interval_secs,
            config.max_interval_secs,
        )
    }

    /// Change the period. Values outside the bounds are clamped.
    pub fn set_secs(&self, secs: f64) -> Result<Duration, IntervalError> {
        if !secs.is_finite() || secs <= 0.0 {
            return Err(IntervalError::Invalid(secs));
        }
        let period = Duration::from_secs_f64(secs).clamp(self.min, self.max);
        let previous = self.tx.send_replace(period);

        tracing::info!(
            previous_secs = previous.as_secs_f64(),
            interval_secs = period.as_secs_f64(),
            "Broadcast interval updated"
        );
        Ok(period)
    }

    pub fn current(&self) -> Duration {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<Duration> {
        self.tx.subscribe()
    }
}

/// Outcome of one broadcast tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub recipients: usize,
    pub delivered: usize,
    pub dropped: usize,
}

/// Periodic telemetry fan-out
pub struct BroadcastScheduler {
    registry: Arc<SessionRegistry>,
    metrics: Arc<dyn MetricsSource>,
    camera: Option<Arc<dyn CameraControl>>,
    interval: BroadcastInterval,
}

impl BroadcastScheduler {
    pub fn new(
        registry: Arc<SessionRegistry>,
        metrics: Arc<dyn MetricsSource>,
        camera: Option<Arc<dyn CameraControl>>,
        interval: BroadcastInterval,
    ) -> Self {
        Self {
            registry,
            metrics,
            camera,
            interval,
        }
    }

    pub fn interval(&self) -> &BroadcastInterval {
        &self.interval
    }

    /// Run until `shutdown` fires. A tick already running is finished first.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        let mut changes = self.interval.subscribe();
        tracing::info!(
            interval_secs = self.interval.current().as_secs_f64(),
            "Broadcast scheduler started"
        );

        loop {
            let period = *changes.borrow_and_update();
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(period) => {
                    self.tick().await;
                }
                // Restart the sleep with the new period
                _ = changes.changed() => {}
            }
        }

        tracing::info!("Broadcast scheduler stopped");
    }

    /// Build one status envelope and offer it to every registered session
    pub async fn tick(&self) -> TickReport {
        let sessions = self.registry.snapshot().await;
        if sessions.is_empty() {
            return TickReport::default();
        }

        let data = self.collect().await;
        let envelope = ResponseEnvelope::success(ResponseKind::SystemStatus, "System status update", data);
        let text: Arc<str> = match envelope.to_json() {
            Ok(text) => text.into(),
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize status update");
                return TickReport::default();
            }
        };

        let mut report = TickReport {
            recipients: sessions.len(),
            ..Default::default()
        };
        for session in sessions {
            match session.try_send_shared(Arc::clone(&text)) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    tracing::warn!(session_id = %session.id(), error = %e, "Dropping session from broadcast");
                    self.registry.unregister(session.id()).await;
                    session.close(CloseReason::Evicted);
                    report.dropped += 1;
                }
            }
        }

        tracing::trace!(
            recipients = report.recipients,
            delivered = report.delivered,
            dropped = report.dropped,
            "Broadcast tick"
        );
        report
    }

    async fn collect(&self) -> Payload {
        let (basic, health, diagnostic) = tokio::join!(
            self.metrics.basic_status(),
            self.metrics.health_metrics(),
            self.metrics.diagnostic_info(),
        );

        let mut data = Payload::new();
        data.insert("basic_status".to_string(), degrade("basic_status", basic));
        data.insert("health_metrics".to_string(), degrade("health_metrics", health));
        data.insert("diagnostic_info".to_string(), degrade("diagnostic_info", diagnostic));

        if let Some(camera) = &self.camera {
            if camera.is_streaming() {
                if let Some(frame) = camera.latest_frame().await {
                    data.insert("camera_frame".to_string(), frame.to_wire());
                }
            }
        }
        data
    }
}

/// Collaborator result as a payload field, `null` on failure
pub(crate) fn degrade(field: &str, result: Result<Telemetry, CollaboratorError>) -> Value {
    match result {
        Ok(telemetry) => Value::Object(telemetry),
        Err(e) => {
            tracing::warn!(field, error = %e, "Telemetry unavailable");
            Value::Null
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::testing::{FakeCamera, FakeMetrics};
    use crate::session::{OutboundRx, Session};
    use std::sync::atomic::Ordering;

    fn scheduler(
        registry: &Arc<SessionRegistry>,
        metrics: Arc<FakeMetrics>,
        camera: Option<Arc<dyn CameraControl>>,
    ) -> BroadcastScheduler {
        BroadcastScheduler::new(
            Arc::clone(registry),
            metrics,
            camera,
            BroadcastInterval::new(1.0, 0.1, 60.0),
        )
    }

    async fn connect(registry: &SessionRegistry, capacity: usize) -> (Arc<Session>, OutboundRx) {
        let (session, rx) = Session::new(None, capacity);
        registry.register(Arc::clone(&session)).await;
        (session, rx)
    }

    fn next_json(rx: &mut OutboundRx) -> Value {
        let text = rx.try_recv().expect("message queued");
        serde_json::from_str(&text).unwrap()
    }

    #[tokio::test]
    async fn test_three_sessions_receive_status_without_camera_frame() {
        let registry = Arc::new(SessionRegistry::new("controller"));
        let camera: Arc<dyn CameraControl> = Arc::new(FakeCamera::new());
        let scheduler = scheduler(&registry, Arc::new(FakeMetrics::default()), Some(camera));

        let mut receivers = Vec::new();
        for _ in 0..3 {
            receivers.push(connect(&registry, 8).await);
        }

        let report = scheduler.tick().await;
        assert_eq!(report, TickReport { recipients: 3, delivered: 3, dropped: 0 });

        for (_session, rx) in receivers.iter_mut() {
            let message = next_json(rx);
            assert_eq!(message["type"], "system_status");
            assert_eq!(message["status"], "success");
            assert_eq!(message["data"]["basic_status"]["system_health"], 91.5);
            assert!(message["data"]["health_metrics"].is_object());
            assert!(message["data"]["diagnostic_info"].is_object());
            assert!(message["data"].get("camera_frame").is_none());
        }
    }

    #[tokio::test]
    async fn test_empty_registry_skips_collaborators() {
        let registry = Arc::new(SessionRegistry::new("controller"));
        let metrics = Arc::new(FakeMetrics::default());
        let scheduler = scheduler(&registry, Arc::clone(&metrics), None);

        assert_eq!(scheduler.tick().await, TickReport::default());
        assert_eq!(metrics.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_full_session_is_dropped_others_still_served() {
        let registry = Arc::new(SessionRegistry::new("controller"));
        let scheduler = scheduler(&registry, Arc::new(FakeMetrics::default()), None);

        let (healthy_a, mut rx_a) = connect(&registry, 8).await;
        let (stuck, _rx_stuck) = connect(&registry, 1).await;
        let (healthy_b, mut rx_b) = connect(&registry, 8).await;
        stuck.try_send_shared(Arc::from("backlog")).unwrap();

        let report = scheduler.tick().await;
        assert_eq!(report.delivered, 2);
        assert_eq!(report.dropped, 1);

        assert!(registry.get(stuck.id()).await.is_none());
        assert_eq!(stuck.close_reason(), CloseReason::Evicted);
        assert!(registry.get(healthy_a.id()).await.is_some());
        assert!(registry.get(healthy_b.id()).await.is_some());
        assert_eq!(next_json(&mut rx_a)["type"], "system_status");
        assert_eq!(next_json(&mut rx_b)["type"], "system_status");
    }

    #[tokio::test]
    async fn test_closed_session_is_dropped() {
        let registry = Arc::new(SessionRegistry::new("controller"));
        let scheduler = scheduler(&registry, Arc::new(FakeMetrics::default()), None);

        let (_gone, rx) = connect(&registry, 8).await;
        drop(rx);

        let report = scheduler.tick().await;
        assert_eq!(report.dropped, 1);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_failed_metrics_degrade_to_null() {
        let registry = Arc::new(SessionRegistry::new("controller"));
        let scheduler = scheduler(&registry, Arc::new(FakeMetrics::failing()), None);
        let (_session, mut rx) = connect(&registry, 8).await;

        scheduler.tick().await;
        let message = next_json(&mut rx);
        assert_eq!(message["status"], "success");
        assert!(message["data"]["basic_status"].is_null());
        assert!(message["data"]["health_metrics"].is_null());
        assert!(message["data"]["diagnostic_info"].is_null());
    }

    #[tokio::test]
    async fn test_streaming_camera_adds_frame() {
        let registry = Arc::new(SessionRegistry::new("controller"));
        let camera: Arc<dyn CameraControl> = Arc::new(FakeCamera::streaming_with_frame(42));
        let scheduler = scheduler(&registry, Arc::new(FakeMetrics::default()), Some(camera));
        let (_session, mut rx) = connect(&registry, 8).await;

        scheduler.tick().await;
        let frame = &next_json(&mut rx)["data"]["camera_frame"];
        assert_eq!(frame["frame_number"], 42);
        assert_eq!(frame["format"], "jpeg");
        assert!(frame["image"].is_string());
    }

    #[test]
    fn test_interval_validation_and_clamping() {
        let interval = BroadcastInterval::new(1.0, 0.1, 60.0);

        assert_eq!(interval.set_secs(2.5).unwrap(), Duration::from_millis(2500));
        assert_eq!(interval.set_secs(0.01).unwrap(), Duration::from_millis(100));
        assert_eq!(interval.set_secs(600.0).unwrap(), Duration::from_secs(60));
        assert_eq!(interval.current(), Duration::from_secs(60));

        assert_eq!(interval.set_secs(0.0), Err(IntervalError::Invalid(0.0)));
        assert!(interval.set_secs(-3.0).is_err());
        assert!(interval.set_secs(f64::NAN).is_err());
        assert_eq!(interval.current(), Duration::from_secs(60));
    }

    #[test]
    fn test_interval_bounds_are_sanitized() {
        let interval = BroadcastInterval::new(0.0, 0.0, f64::INFINITY);
        assert_eq!(interval.current(), Duration::from_millis(100));
        assert_eq!(interval.set_secs(5.0).unwrap(), Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_run_delivers_and_stops_on_shutdown() {
        let registry = Arc::new(SessionRegistry::new("controller"));
        let scheduler = Arc::new(scheduler(&registry, Arc::new(FakeMetrics::default()), None));
        scheduler.interval().set_secs(0.1).unwrap();
        let (_session, mut rx) = connect(&registry, 8).await;

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(Arc::clone(&scheduler).run(shutdown.clone()));

        let text = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("broadcast within timeout")
            .expect("channel open");
        assert!(text.contains("system_status"));

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("scheduler stops")
            .unwrap();
    }
}
