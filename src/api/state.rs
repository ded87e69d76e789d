//! Application State
//!
//! Everything the handlers and background workers share, built once at
//! startup and passed around behind an `Arc`.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::api::error::{ApiError, ApiResult};
use crate::config::Config;
use crate::control::{BroadcastInterval, BroadcastScheduler, CommandDispatcher};
use crate::device::{CameraControl, HostMetrics, MetricsSource, RelayCamera};
use crate::ingest::{build_sink, FrameRelay, FrameSink};
use crate::links::{LinkConnector, LinkManager, TcpConnector};
use crate::rate_limit::RateLimiter;
use crate::session::{SessionRegistry, TransportLimits};

/// Shared application state for all handlers
pub struct AppState {
    /// Effective configuration
    pub config: Arc<Config>,
    /// Server start time for uptime tracking
    pub started_at: Instant,
    /// Sessions on `/ws`
    pub controllers: Arc<SessionRegistry>,
    /// Sessions on `/ingest`
    pub producers: Arc<SessionRegistry>,
    pub dispatcher: Arc<CommandDispatcher>,
    pub scheduler: Arc<BroadcastScheduler>,
    pub interval: BroadcastInterval,
    /// Latest frame from any producer
    pub relay: Arc<FrameRelay>,
    /// Where ingested frames go
    pub sink: Arc<dyn FrameSink>,
    /// Admission control for upgrades and link creation
    pub admission: Arc<RateLimiter>,
    pub links: Arc<LinkManager>,
    pub limits: TransportLimits,
    /// Cancelled once shutdown starts
    pub shutdown: CancellationToken,
    /// Every session task, awaited during shutdown
    pub tasks: TaskTracker,
}

impl AppState {
    /// Build state with host metrics, the relay-fed camera and TCP links
    pub fn new(config: Config) -> Self {
        Self::with_connector(config, Arc::new(TcpConnector))
    }

    /// Build state with a custom link connector
    pub fn with_connector(config: Config, connector: Arc<dyn LinkConnector>) -> Self {
        let relay = Arc::new(FrameRelay::new());
        let camera: Option<Arc<dyn CameraControl>> = if config.camera.enabled {
            Some(Arc::new(RelayCamera::new(
                Arc::clone(&relay),
                config.camera.url.clone(),
            )))
        } else {
            None
        };
        Self::with_collaborators(config, Arc::new(HostMetrics::new()), camera, relay, connector)
    }

    /// Build state around explicit collaborators
    pub fn with_collaborators(
        config: Config,
        metrics: Arc<dyn MetricsSource>,
        camera: Option<Arc<dyn CameraControl>>,
        relay: Arc<FrameRelay>,
        connector: Arc<dyn LinkConnector>,
    ) -> Self {
        let controllers = Arc::new(SessionRegistry::new("controller"));
        let producers = Arc::new(SessionRegistry::new("producer"));
        let interval = BroadcastInterval::from_config(&config.broadcast);

        let dispatcher = Arc::new(CommandDispatcher::new(
            Arc::clone(&metrics),
            camera.clone(),
            interval.clone(),
        ));
        let scheduler = Arc::new(BroadcastScheduler::new(
            Arc::clone(&controllers),
            metrics,
            camera,
            interval.clone(),
        ));

        let sink = build_sink(
            config.camera.display_mode,
            &config.camera.save_dir,
            Arc::clone(&relay),
        );

        Self {
            controllers,
            producers,
            dispatcher,
            scheduler,
            interval,
            relay,
            sink,
            admission: Arc::new(RateLimiter::from_config(&config.rate_limit)),
            links: Arc::new(LinkManager::new(connector, &config.links)),
            limits: TransportLimits::from(&config.transport),
            shutdown: CancellationToken::new(),
            tasks: TaskTracker::new(),
            started_at: Instant::now(),
            config: Arc::new(config),
        }
    }

    /// Get server uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    /// Admit one request from `ip`, or reject it as rate limited
    pub fn admit(&self, ip: IpAddr) -> ApiResult<()> {
        if self.admission.is_allowed(&ip.to_string()) {
            Ok(())
        } else {
            Err(ApiError::RateLimited)
        }
    }
}
