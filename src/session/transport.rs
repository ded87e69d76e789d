//! WebSocket transport driver
//!
//! Runs the three tasks behind every session:
//!
//! - **reader**: socket → bounded inbound queue (overflow is rejected here,
//!   before the message reaches any handler)
//! - **processor**: inbound queue → [`InboundHandler`], one message at a time,
//!   so responses keep the order commands arrived in
//! - **writer**: outbound queue → socket, plus keep-alive pings

use async_trait::async_trait;
use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::handle::{CloseReason, OutboundRx, Session};
use crate::config::TransportConfig;

/// How long the writer may keep flushing after the peer went away
const CLOSE_FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

/// A data message received from the peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Text(String),
    Binary(Vec<u8>),
}

impl Inbound {
    pub fn len(&self) -> usize {
        match self {
            Inbound::Text(text) => text.len(),
            Inbound::Binary(bytes) => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// What the processor should do after handling a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Close,
}

/// Per-session message handler
#[async_trait]
pub trait InboundHandler: Send + 'static {
    /// Handle one inbound message
    async fn handle(&mut self, session: &Arc<Session>, message: Inbound) -> Flow;

    /// Reply queued when a message is rejected because the inbound queue is
    /// full. `None` drops the message silently.
    fn overflow_reply(&self) -> Option<String> {
        None
    }
}

/// Transport-level limits applied to every session
#[derive(Debug, Clone)]
pub struct TransportLimits {
    /// Largest accepted message, in bytes
    pub max_message_size: usize,
    /// Inbound messages buffered ahead of the handler
    pub inbound_queue: usize,
    /// Outbound messages buffered ahead of the socket
    pub outbound_queue: usize,
    /// Keep-alive ping period
    pub ping_interval: Duration,
    /// How long past a ping the peer may stay silent
    pub ping_timeout: Duration,
}

impl Default for TransportLimits {
    fn default() -> Self {
        Self::from(&TransportConfig::default())
    }
}

impl From<&TransportConfig> for TransportLimits {
    fn from(config: &TransportConfig) -> Self {
        Self {
            max_message_size: config.max_message_size,
            inbound_queue: config.inbound_queue.max(1),
            outbound_queue: config.outbound_queue.max(1),
            ping_interval: Duration::from_secs_f64(config.ping_interval_secs.max(0.1)),
            ping_timeout: Duration::from_secs_f64(config.ping_timeout_secs.max(0.1)),
        }
    }
}

/// Drive one upgraded socket until either side closes.
pub async fn serve_socket<H: InboundHandler>(
    socket: WebSocket,
    session: Arc<Session>,
    outbound: OutboundRx,
    mut handler: H,
    limits: TransportLimits,
    shutdown: CancellationToken,
) {
    let (sink, stream) = socket.split();
    let (inbound_tx, mut inbound_rx) = mpsc::channel::<Inbound>(limits.inbound_queue);
    let overflow = handler.overflow_reply();

    let mut writer = tokio::spawn(write_loop(
        sink,
        outbound,
        Arc::clone(&session),
        limits.clone(),
        shutdown,
    ));

    let mut reader = tokio::spawn(read_loop(
        stream,
        inbound_tx,
        Arc::clone(&session),
        overflow,
    ));

    let processing = Arc::clone(&session);
    let processor = tokio::spawn(async move {
        while let Some(message) = inbound_rx.recv().await {
            if handler.handle(&processing, message).await == Flow::Close {
                processing.close(CloseReason::Normal);
                break;
            }
        }
    });

    // Wait for either side to finish
    tokio::select! {
        _ = &mut writer => {
            reader.abort();
        }
        _ = &mut reader => {
            settle_writer(&session, &mut writer, CLOSE_FLUSH_TIMEOUT).await;
        }
    }
    processor.abort();
    session.mark_closed();

    tracing::debug!(session_id = %session.id(), "Socket tasks finished");
}

/// Stop the writer once the reader is done.
///
/// A closing session's writer is flushing queued responses and the close
/// frame, so it gets up to `grace` to finish. Otherwise it is aborted.
async fn settle_writer(session: &Session, writer: &mut JoinHandle<()>, grace: Duration) {
    if session.is_closing() {
        if tokio::time::timeout(grace, &mut *writer).await.is_ok() {
            return;
        }
        tracing::debug!(session_id = %session.id(), "Close flush timed out");
    }
    writer.abort();
}

async fn read_loop(
    mut stream: SplitStream<WebSocket>,
    inbound: mpsc::Sender<Inbound>,
    session: Arc<Session>,
    overflow: Option<String>,
) {
    while let Some(result) = stream.next().await {
        let message = match result {
            Ok(message) => message,
            Err(e) => {
                tracing::debug!(session_id = %session.id(), error = %e, "WebSocket receive error");
                break;
            }
        };
        session.touch();

        let message = match message {
            Message::Text(text) => Inbound::Text(text),
            Message::Binary(bytes) => Inbound::Binary(bytes),
            // Axum answers pings itself; both only count as activity
            Message::Ping(_) | Message::Pong(_) => continue,
            Message::Close(_) => {
                tracing::debug!(session_id = %session.id(), "Peer requested close");
                break;
            }
        };

        match inbound.try_send(message) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(rejected)) => {
                tracing::warn!(
                    session_id = %session.id(),
                    size = rejected.len(),
                    "Inbound queue full, message rejected"
                );
                if let Some(reply) = &overflow {
                    let _ = session.try_send_shared(Arc::from(reply.as_str()));
                }
            }
            Err(mpsc::error::TrySendError::Closed(_)) => break,
        }
    }
}

async fn write_loop(
    mut sink: SplitSink<WebSocket, Message>,
    mut outbound: OutboundRx,
    session: Arc<Session>,
    limits: TransportLimits,
    shutdown: CancellationToken,
) {
    let mut keepalive =
        tokio::time::interval_at(Instant::now() + limits.ping_interval, limits.ping_interval);
    keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            _ = session.closing() => {
                // Flush what was queued before the close request
                while let Ok(text) = outbound.try_recv() {
                    if sink.send(Message::Text(text.to_string())).await.is_err() {
                        return;
                    }
                }
                let reason = session.close_reason();
                let frame = CloseFrame {
                    code: reason.code(),
                    reason: reason.as_str().into(),
                };
                let _ = sink.send(Message::Close(Some(frame))).await;
                let _ = sink.close().await;
                return;
            }

            _ = shutdown.cancelled() => {
                session.close(CloseReason::GoingAway);
            }

            next = outbound.recv() => {
                let Some(text) = next else { return };
                if sink.send(Message::Text(text.to_string())).await.is_err() {
                    tracing::debug!(session_id = %session.id(), "WebSocket send failed, closing connection");
                    return;
                }
            }

            _ = keepalive.tick() => {
                if session.idle_for() > limits.ping_interval + limits.ping_timeout {
                    tracing::warn!(session_id = %session.id(), "Peer missed keep-alive, closing");
                    session.close(CloseReason::KeepaliveTimeout);
                } else if sink.send(Message::Ping(Vec::new())).await.is_err() {
                    return;
                }
            }
        }
    }
}
