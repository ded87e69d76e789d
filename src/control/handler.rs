//! Controller WebSocket endpoint

use async_trait::async_trait;
use axum::{
    extract::{
        ws::{WebSocket, WebSocketUpgrade},
        ConnectInfo, State,
    },
    response::Response,
};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;

use super::dispatcher::CommandDispatcher;
use crate::api::{ApiResult, AppState};
use crate::protocol::{into_payload, ResponseEnvelope, ResponseKind};
use crate::session::{serve_socket, Flow, Inbound, InboundHandler, Session};

/// GET /ws
pub async fn control_socket(
    ws: WebSocketUpgrade,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Response> {
    state.admit(peer.ip())?;

    let tasks = state.tasks.clone();
    Ok(ws
        .max_message_size(state.limits.max_message_size)
        .on_upgrade(move |socket| tasks.track_future(run_controller(socket, peer, state))))
}

async fn run_controller(socket: WebSocket, peer: SocketAddr, state: Arc<AppState>) {
    let (session, outbound) = Session::new(Some(peer), state.limits.outbound_queue);
    state.controllers.register(Arc::clone(&session)).await;

    tracing::info!(session_id = %session.id(), peer = %peer, "Controller connected");

    let greeting = ResponseEnvelope::success(
        ResponseKind::ConnectionStatus,
        "Connected to device",
        into_payload(json!({
            "session_id": session.id(),
            "broadcast_interval": state.interval.current().as_secs_f64(),
        })),
    )
    .with_client_id(Some(session.id().to_string()));
    if let Err(e) = session.send_json(&greeting).await {
        tracing::warn!(session_id = %session.id(), error = %e, "Failed to send greeting");
    }

    let handler = ControlHandler {
        dispatcher: Arc::clone(&state.dispatcher),
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

    state.controllers.unregister(session.id()).await;
    tracing::info!(
        session_id = %session.id(),
        reason = session.close_reason().as_str(),
        "Controller disconnected"
    );
}

struct ControlHandler {
    dispatcher: Arc<CommandDispatcher>,
}

#[async_trait]
impl InboundHandler for ControlHandler {
    async fn handle(&mut self, session: &Arc<Session>, message: Inbound) -> Flow {
        match message {
            Inbound::Text(text) => self.dispatcher.dispatch(session, &text).await,
            Inbound::Binary(_) => {
                let response = ResponseEnvelope::error("Binary messages not supported")
                    .with_client_id(Some(session.id().to_string()));
                if let Err(e) = session.send_json(&response).await {
                    tracing::debug!(session_id = %session.id(), error = %e, "Response not delivered");
                }
                Flow::Continue
            }
        }
    }

    fn overflow_reply(&self) -> Option<String> {
        ResponseEnvelope::error("Server busy, command dropped")
            .to_json()
            .ok()
    }
}
