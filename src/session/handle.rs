//! A single live duplex connection

use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use uuid::Uuid;

/// Unique identifier for a session
pub type SessionId = Uuid;

/// Receiving half of a session's outbound queue, drained by the socket writer
pub type OutboundRx = mpsc::Receiver<Arc<str>>;

/// Why a session is being closed by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Client asked to disconnect
    Normal,
    /// Server is shutting down
    GoingAway,
    /// Peer stopped answering keep-alive pings
    KeepaliveTimeout,
    /// Peer could not keep up with its outbound queue
    Evicted,
}

impl CloseReason {
    /// WebSocket close code
    pub fn code(&self) -> u16 {
        match self {
            CloseReason::Normal => 1000,
            CloseReason::GoingAway => 1001,
            CloseReason::KeepaliveTimeout => 1011,
            CloseReason::Evicted => 1008,
        }
    }

    /// Human readable close reason
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::Normal => "disconnected",
            CloseReason::GoingAway => "server shutting down",
            CloseReason::KeepaliveTimeout => "keep-alive timeout",
            CloseReason::Evicted => "outbound queue overflow",
        }
    }
}

/// Errors raised when queueing a message on a session
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session {0} is closed")]
    Closed(SessionId),

    #[error("Outbound queue full for session {0}")]
    QueueFull(SessionId),

    #[error("Failed to serialize message: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Handle to one open connection.
///
/// Messages are queued on a bounded channel and written to the socket by a
/// dedicated writer task, so queueing order is delivery order.
pub struct Session {
    id: SessionId,
    peer: Option<SocketAddr>,
    connected_at: DateTime<Utc>,
    outbound: mpsc::Sender<Arc<str>>,
    alive: AtomicBool,
    last_activity_ms: AtomicI64,
    closing: CancellationToken,
    close_reason: OnceLock<CloseReason>,
}

/// Serializable view of a session for diagnostics
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub id: SessionId,
    pub peer: Option<String>,
    pub alive: bool,
    pub connected_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl Session {
    /// Create a session with an outbound queue of `capacity` messages.
    ///
    /// Returns the session and the receiver the socket writer drains.
    pub fn new(peer: Option<SocketAddr>, capacity: usize) -> (Arc<Self>, OutboundRx) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let now = Utc::now();

        let session = Arc::new(Self {
            id: Uuid::new_v4(),
            peer,
            connected_at: now,
            outbound: tx,
            alive: AtomicBool::new(true),
            last_activity_ms: AtomicI64::new(now.timestamp_millis()),
            closing: CancellationToken::new(),
            close_reason: OnceLock::new(),
        });

        (session, rx)
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Whether the session is open and not being closed
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire) && !self.closing.is_cancelled()
    }

    /// Last time anything was received from the peer
    pub fn last_activity(&self) -> DateTime<Utc> {
        let ms = self.last_activity_ms.load(Ordering::Relaxed);
        Utc.timestamp_millis_opt(ms).single().unwrap_or(self.connected_at)
    }

    /// Time since the peer was last heard from
    pub fn idle_for(&self) -> Duration {
        let elapsed = Utc::now().timestamp_millis() - self.last_activity_ms.load(Ordering::Relaxed);
        Duration::from_millis(elapsed.max(0) as u64)
    }

    /// Record inbound activity
    pub fn touch(&self) {
        self.last_activity_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    /// Queue a text message, waiting for queue capacity.
    ///
    /// Used for command responses, which must not be dropped.
    pub async fn send_text(&self, text: impl Into<Arc<str>>) -> Result<(), SessionError> {
        self.outbound
            .send(text.into())
            .await
            .map_err(|_| SessionError::Closed(self.id))
    }

    /// Serialize and queue a message, waiting for queue capacity
    pub async fn send_json<T: Serialize>(&self, message: &T) -> Result<(), SessionError> {
        let text = serde_json::to_string(message)?;
        self.send_text(text).await
    }

    /// Queue a shared message without waiting.
    ///
    /// Used for broadcast fan-out: a full queue is reported rather than
    /// stalling delivery to other sessions.
    pub fn try_send_shared(&self, text: Arc<str>) -> Result<(), SessionError> {
        self.outbound.try_send(text).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SessionError::QueueFull(self.id),
            mpsc::error::TrySendError::Closed(_) => SessionError::Closed(self.id),
        })
    }

    /// Ask the writer to flush queued messages and close the socket.
    ///
    /// Idempotent; the first reason wins.
    pub fn close(&self, reason: CloseReason) {
        let _ = self.close_reason.set(reason);
        self.closing.cancel();
    }

    /// Whether a close has been requested
    pub fn is_closing(&self) -> bool {
        self.closing.is_cancelled()
    }

    /// Resolves once a close has been requested
    pub fn closing(&self) -> WaitForCancellationFuture<'_> {
        self.closing.cancelled()
    }

    /// Reason given to the first `close` call
    pub fn close_reason(&self) -> CloseReason {
        self.close_reason
            .get()
            .copied()
            .unwrap_or(CloseReason::Normal)
    }

    /// Record that the transport is gone
    pub(crate) fn mark_closed(&self) {
        self.alive.store(false, Ordering::Release);
    }

    /// Diagnostic snapshot
    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            id: self.id,
            peer: self.peer.map(|p| p.to_string()),
            alive: self.is_alive(),
            connected_at: self.connected_at,
            last_activity: self.last_activity(),
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("alive", &self.is_alive())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_send_preserves_order() {
        let (session, mut rx) = Session::new(None, 8);

        session.send_text("first").await.unwrap();
        session.send_text("second").await.unwrap();

        assert_eq!(&*rx.recv().await.unwrap(), "first");
        assert_eq!(&*rx.recv().await.unwrap(), "second");
    }

    #[test]
    fn test_try_send_reports_full_queue() {
        let (session, _rx) = Session::new(None, 1);

        session.try_send_shared(Arc::from("a")).unwrap();
        let err = session.try_send_shared(Arc::from("b")).unwrap_err();
        assert!(matches!(err, SessionError::QueueFull(_)));
    }

    #[test]
    fn test_try_send_reports_closed_receiver() {
        let (session, rx) = Session::new(None, 4);
        drop(rx);

        let err = session.try_send_shared(Arc::from("a")).unwrap_err();
        assert!(matches!(err, SessionError::Closed(_)));
    }

    #[test]
    fn test_close_is_idempotent_first_reason_wins() {
        let (session, _rx) = Session::new(None, 4);
        assert!(session.is_alive());

        session.close(CloseReason::GoingAway);
        session.close(CloseReason::Normal);

        assert!(!session.is_alive());
        assert_eq!(session.close_reason(), CloseReason::GoingAway);
        assert_eq!(session.close_reason().code(), 1001);
    }

    #[test]
    fn test_touch_resets_idle_time() {
        let (session, _rx) = Session::new(None, 4);
        session.touch();
        assert!(session.idle_for() < Duration::from_secs(1));
        assert!(session.last_activity() >= session.info().connected_at);
    }
}
