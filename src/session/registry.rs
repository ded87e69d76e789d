//! Session Registry
//!
//! Tracks every live session of one kind (controllers or producers).
//! Broadcasts iterate over a snapshot, so sessions registered or removed
//! mid-broadcast take effect on the next tick.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::handle::{CloseReason, Session, SessionId, SessionInfo};

/// Set of live sessions
pub struct SessionRegistry {
    /// Active sessions: SessionId → Session
    sessions: RwLock<HashMap<SessionId, Arc<Session>>>,
    /// Label used in log lines ("controller", "producer")
    label: &'static str,
}

impl SessionRegistry {
    /// Create an empty registry
    pub fn new(label: &'static str) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            label,
        }
    }

    /// Add a session. Registering the same session twice is a no-op.
    pub async fn register(&self, session: Arc<Session>) {
        let id = session.id();
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&id) {
            return;
        }
        sessions.insert(id, session);
        let total = sessions.len();
        drop(sessions);

        tracing::info!(session_id = %id, kind = self.label, total, "Session registered");
    }

    /// Remove a session if present.
    ///
    /// Returns whether a session was removed; removing an absent id is not
    /// an error.
    pub async fn unregister(&self, id: SessionId) -> bool {
        let mut sessions = self.sessions.write().await;
        let removed = sessions.remove(&id).is_some();
        let total = sessions.len();
        drop(sessions);

        if removed {
            tracing::info!(session_id = %id, kind = self.label, total, "Session unregistered");
        }
        removed
    }

    /// Stable copy of the current sessions
    pub async fn snapshot(&self) -> Vec<Arc<Session>> {
        self.sessions.read().await.values().cloned().collect()
    }

    /// Look up one session
    pub async fn get(&self, id: SessionId) -> Option<Arc<Session>> {
        self.sessions.read().await.get(&id).cloned()
    }

    /// Number of registered sessions
    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Diagnostic view of every session
    pub async fn describe(&self) -> Vec<SessionInfo> {
        self.sessions
            .read()
            .await
            .values()
            .map(|s| s.info())
            .collect()
    }

    /// Ask every session to flush and close.
    ///
    /// Sessions unregister themselves once their socket tasks finish.
    pub async fn close_all(&self, reason: CloseReason) -> usize {
        let sessions = self.snapshot().await;
        for session in &sessions {
            session.close(reason);
        }

        if !sessions.is_empty() {
            tracing::info!(kind = self.label, count = sessions.len(), reason = reason.as_str(), "Closing sessions");
        }
        sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_register_unregister() {
        let registry = SessionRegistry::new("controller");
        let (session, _rx) = Session::new(None, 4);

        registry.register(Arc::clone(&session)).await;
        assert_eq!(registry.count().await, 1);

        assert!(registry.unregister(session.id()).await);
        assert_eq!(registry.count().await, 0);
    }

    #[tokio::test]
    async fn test_register_is_idempotent() {
        let registry = SessionRegistry::new("controller");
        let (session, _rx) = Session::new(None, 4);

        registry.register(Arc::clone(&session)).await;
        registry.register(Arc::clone(&session)).await;
        assert_eq!(registry.count().await, 1);
    }

    #[tokio::test]
    async fn test_unregister_absent_is_noop() {
        let registry = SessionRegistry::new("controller");
        let (session, _rx) = Session::new(None, 4);

        assert!(!registry.unregister(session.id()).await);
        registry.register(Arc::clone(&session)).await;
        assert!(registry.unregister(session.id()).await);
        assert!(!registry.unregister(session.id()).await);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_count_matches_net_registrations() {
        let registry = SessionRegistry::new("controller");
        let sessions: Vec<_> = (0..6).map(|_| Session::new(None, 4)).collect();

        for (session, _) in &sessions {
            registry.register(Arc::clone(session)).await;
        }
        for (session, _) in sessions.iter().step_by(2) {
            registry.unregister(session.id()).await;
            registry.unregister(session.id()).await;
        }

        assert_eq!(registry.count().await, 3);
        assert!(registry.get(sessions[1].0.id()).await.is_some());
        assert!(registry.get(sessions[0].0.id()).await.is_none());
    }

    #[tokio::test]
    async fn test_snapshot_is_detached() {
        let registry = SessionRegistry::new("controller");
        let (a, _rx_a) = Session::new(None, 4);
        let (b, _rx_b) = Session::new(None, 4);
        registry.register(Arc::clone(&a)).await;

        let snapshot = registry.snapshot().await;
        registry.register(Arc::clone(&b)).await;
        registry.unregister(a.id()).await;

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].id(), a.id());
        assert_eq!(registry.count().await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_register_unregister() {
        let registry = Arc::new(SessionRegistry::new("controller"));
        let (session, _rx) = Session::new(None, 4);

        let mut handles = Vec::new();
        for i in 0..16 {
            let registry = Arc::clone(&registry);
            let session = Arc::clone(&session);
            handles.push(tokio::spawn(async move {
                if i % 2 == 0 {
                    registry.register(session).await;
                } else {
                    registry.unregister(session.id()).await;
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert!(registry.count().await <= 1);
        registry.unregister(session.id()).await;
        assert_eq!(registry.count().await, 0);
    }

    #[tokio::test]
    async fn test_close_all_requests_close() {
        let registry = SessionRegistry::new("producer");
        let (a, _rx_a) = Session::new(None, 4);
        let (b, _rx_b) = Session::new(None, 4);
        registry.register(Arc::clone(&a)).await;
        registry.register(Arc::clone(&b)).await;

        assert_eq!(registry.close_all(CloseReason::GoingAway).await, 2);
        assert!(!a.is_alive());
        assert_eq!(b.close_reason(), CloseReason::GoingAway);
    }
}
