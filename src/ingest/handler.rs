//! Producer WebSocket endpoint
//!
//! `GET /ingest` upgrades to a producer session that pushes frames and
//! receives one reply per message.

use async_trait::async_trait;
use axum::{
    extract::{
        ws::{WebSocket, WebSocketUpgrade},
        ConnectInfo, State,
    },
    response::Response,
};
use std::net::SocketAddr;
use std::sync::Arc;

use super::pipeline::{FramePipeline, IngestReply};
use crate::api::{ApiResult, AppState};
use crate::session::{serve_socket, Flow, Inbound, InboundHandler, Session};

/// GET /ingest
pub async fn ingest_socket(
    ws: WebSocketUpgrade,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Response> {
    state.admit(peer.ip())?;

    let tasks = state.tasks.clone();
    Ok(ws
        .max_message_size(state.limits.max_message_size)
        .on_upgrade(move |socket| tasks.track_future(run_producer(socket, peer, state))))
}

async fn run_producer(socket: WebSocket, peer: SocketAddr, state: Arc<AppState>) {
    let (session, outbound) = Session::new(Some(peer), state.limits.outbound_queue);
    state.producers.register(Arc::clone(&session)).await;
    let _attached = state.relay.attach_producer();

    tracing::info!(session_id = %session.id(), peer = %peer, sink = state.sink.name(), "Producer connected");

    if let Err(e) = session.send_json(&IngestReply::ready()).await {
        tracing::warn!(session_id = %session.id(), error = %e, "Failed to send ready message");
    }

    let handler = ProducerHandler {
        pipeline: FramePipeline::new(Arc::clone(&state.sink)),
    };
    serve_socket(
        socket,
        Arc::clone(&session),
        outbound,
        handler,
        state.limits.clone(),
        state.shutdown.clone(),
    )
    .await;

    state.producers.unregister(session.id()).await;
    tracing::info!(session_id = %session.id(), "Producer disconnected");
}

/// Feeds producer messages through the frame pipeline
struct ProducerHandler {
    pipeline: FramePipeline,
}

#[async_trait]
impl InboundHandler for ProducerHandler {
    async fn handle(&mut self, session: &Arc<Session>, message: Inbound) -> Flow {
        if let Some(reply) = self.pipeline.process(message).await {
            if let Err(e) = session.send_json(&reply).await {
                tracing::debug!(session_id = %session.id(), error = %e, "Reply not delivered");
            }
        }
        Flow::Continue
    }
}

impl Drop for ProducerHandler {
    fn drop(&mut self) {
        tracing::info!(frames = self.pipeline.frame_count(), "Producer stream ended");
    }
}
