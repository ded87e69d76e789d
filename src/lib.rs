//! # airlink
//!
//! Control plane for a remotely operated, camera-equipped device node.
//!
//! Controllers hold WebSocket sessions on `/ws`, send typed commands and
//! receive periodic telemetry. A producer pushes camera frames to `/ingest`;
//! frames are acknowledged one by one and relayed into the controllers'
//! status broadcasts while streaming is on.
//!
//! ## Modules
//!
//! - [`protocol`]: Command and response envelopes
//! - [`session`]: Session handles, registries and the socket driver
//! - [`control`]: Command dispatcher and broadcast scheduler
//! - [`ingest`]: Frame decoding, numbering, sinks and relay
//! - [`device`]: Metrics and camera collaborators
//! - [`links`]: Managed outbound links with a retry state machine
//! - [`rate_limit`]: Sliding-window admission control
//! - [`api`]: Router, HTTP routes and server lifecycle
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use airlink::{serve, AppState, Config};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load_default();
//!     serve(Arc::new(AppState::new(config))).await?;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod control;
pub mod device;
pub mod frame;
pub mod ingest;
pub mod links;
pub mod protocol;
pub mod rate_limit;
pub mod session;

// Re-export top-level types for convenience
pub use api::{build_router, serve, ApiError, AppState};

pub use config::{Config, ConfigError, ConfigOrigin, DisplayMode};

pub use control::{BroadcastInterval, BroadcastScheduler, CommandDispatcher, IntervalError};

pub use device::{CameraControl, CollaboratorError, HostMetrics, MetricsSource, RelayCamera};

pub use frame::{Frame, ImageFormat};

pub use ingest::{DecodeError, FramePipeline, FrameRelay, FrameSink, IngestReply};

pub use links::{Connection, ConnectionState, LinkError, LinkManager, TransportKind};

pub use protocol::{CommandEnvelope, CommandKind, ResponseEnvelope, ResponseKind};

pub use rate_limit::RateLimiter;

pub use session::{CloseReason, Session, SessionRegistry};
