//! Controller plane
//!
//! Controllers connect on `/ws`, send [`CommandEnvelope`](crate::protocol::CommandEnvelope)s
//! and receive one response per command, interleaved with periodic
//! `system_status` broadcasts.

mod broadcast;
mod dispatcher;
mod handler;

#[cfg(test)]
pub(crate) mod testing;

pub use broadcast::{
    BroadcastInterval, BroadcastScheduler, IntervalError, TickReport, MIN_INTERVAL_SECS,
};
pub use dispatcher::CommandDispatcher;
pub use handler::control_socket;
