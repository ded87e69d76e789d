//! Sessions
//!
//! Live WebSocket connections and the registry that owns them.
//!
//! ## Architecture
//!
//! - **Session**: handle to one connection with a bounded outbound queue
//! - **SessionRegistry**: the set of live sessions, read via snapshots
//! - **Transport**: reader / processor / writer tasks for an upgraded socket

mod handle;
mod registry;
mod transport;

pub use handle::{CloseReason, OutboundRx, Session, SessionError, SessionId, SessionInfo};
pub use registry::SessionRegistry;
pub use transport::{serve_socket, Flow, Inbound, InboundHandler, TransportLimits};
