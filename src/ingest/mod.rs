//! Frame Ingest
//!
//! Producers push camera frames over `/ingest`, as base64 JSON
//! (`{"image": "..."}`) or raw binary messages. Each frame is validated,
//! numbered, handed to the configured sink and acknowledged.

pub mod decode;
mod handler;
mod pipeline;
mod relay;
mod sink;

pub use decode::{decode_base64, decode_frame, inspect, DecodeError, ImageInfo};
pub use handler::ingest_socket;
pub use pipeline::{FramePipeline, IngestReply};
pub use relay::{FrameRelay, ProducerGuard};
pub use sink::{build_sink, DiscardSink, FrameSink, RelaySink, SaveSink, SinkError};
