//! Link Manager
//!
//! Owns every managed link and drives connection attempts through the
//! lifecycle state machine.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::connection::{Connection, ConnectionState, ConnectionSummary, TransportKind};
use super::connector::{LinkConnector, LinkTarget};
use super::LinkError;
use crate::config::LinksConfig;

type SharedConnection = Arc<Mutex<Connection>>;

/// Registry of managed links
pub struct LinkManager {
    connector: Arc<dyn LinkConnector>,
    links: RwLock<HashMap<Uuid, SharedConnection>>,
    max_retries: u32,
    connect_timeout: Duration,
    retry_backoff: Duration,
}

fn lock(conn: &SharedConnection) -> MutexGuard<'_, Connection> {
    conn.lock().unwrap_or_else(PoisonError::into_inner)
}

impl LinkManager {
    pub fn new(connector: Arc<dyn LinkConnector>, config: &LinksConfig) -> Self {
        Self {
            connector,
            links: RwLock::new(HashMap::new()),
            max_retries: config.max_retries,
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
        }
    }

    /// Connect to a device, retrying until the retry budget is spent.
    ///
    /// The link is visible through [`status`](Self::status) while attempts
    /// are in progress. A link that exhausts its retries is dropped.
    pub async fn establish(
        &self,
        device_id: &str,
        address: &str,
        transport: TransportKind,
    ) -> Result<ConnectionSummary, LinkError> {
        let target = LinkTarget {
            device_id: device_id.to_string(),
            address: address.to_string(),
            transport,
        };
        // Reject unusable addresses before spending any attempts
        target.socket_address()?;

        let conn = Connection::new(device_id, address, transport).with_max_retries(self.max_retries);
        let id = conn.connection_id();
        let shared = Arc::new(Mutex::new(conn));
        self.links.write().await.insert(id, Arc::clone(&shared));

        tracing::info!(connection_id = %id, device_id, address, "Establishing link");

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            if attempt > 1 && !self.links.read().await.contains_key(&id) {
                tracing::info!(connection_id = %id, "Link removed while retrying");
                return Err(LinkError::NotFound(id));
            }
            let outcome = match tokio::time::timeout(self.connect_timeout, self.connector.connect(&target)).await {
                Ok(result) => result,
                Err(_) => Err(LinkError::Timeout {
                    address: address.to_string(),
                    secs: self.connect_timeout.as_secs(),
                }),
            };

            match outcome {
                Ok(device_name) => {
                    // Held across the update so a concurrent disconnect cannot interleave
                    let links = self.links.read().await;
                    if !links.contains_key(&id) {
                        tracing::info!(connection_id = %id, "Link removed before connect completed");
                        return Err(LinkError::NotFound(id));
                    }
                    let summary = {
                        let mut conn = lock(&shared);
                        conn.update_status(ConnectionState::Connected, None);
                        conn.identify(device_name);
                        conn.reset_retries();
                        conn.summary()
                    };
                    drop(links);
                    tracing::info!(connection_id = %id, attempt, "Link connected");
                    return Ok(summary);
                }
                Err(e) => {
                    let state = match &e {
                        LinkError::Timeout { .. } => ConnectionState::Timeout,
                        _ => ConnectionState::Failed,
                    };
                    let can_retry = {
                        let mut conn = lock(&shared);
                        conn.update_status(state, Some(e.to_string()));
                        conn.increment_retry()
                    };

                    if !can_retry {
                        self.links.write().await.remove(&id);
                        tracing::warn!(connection_id = %id, attempts = attempt, error = %e, "Link failed, giving up");
                        return Err(LinkError::Exhausted {
                            device_id: device_id.to_string(),
                            attempts: attempt,
                            last_error: e.to_string(),
                        });
                    }

                    tracing::warn!(connection_id = %id, attempt, error = %e, "Link attempt failed, retrying");
                    tokio::time::sleep(self.retry_backoff * attempt).await;
                    lock(&shared).update_status(ConnectionState::Connecting, Some(e.to_string()));
                }
            }
        }
    }

    /// Current view of one link
    pub async fn status(&self, id: Uuid) -> Option<ConnectionSummary> {
        let shared = self.links.read().await.get(&id).cloned()?;
        let summary = lock(&shared).summary();
        Some(summary)
    }

    /// Every managed link
    pub async fn list(&self) -> Vec<ConnectionSummary> {
        let links: Vec<SharedConnection> = self.links.read().await.values().cloned().collect();
        let mut summaries: Vec<ConnectionSummary> = links.iter().map(|c| lock(c).summary()).collect();
        summaries.sort_by(|a, b| a.device_id.cmp(&b.device_id));
        summaries
    }

    /// Mark a link disconnected and stop managing it
    pub async fn disconnect(&self, id: Uuid) -> Result<ConnectionSummary, LinkError> {
        let shared = self
            .links
            .write()
            .await
            .remove(&id)
            .ok_or(LinkError::NotFound(id))?;

        let summary = {
            let mut conn = lock(&shared);
            conn.update_status(ConnectionState::Disconnected, None);
            conn.summary()
        };
        tracing::info!(connection_id = %id, "Link disconnected");
        Ok(summary)
    }

    /// Number of links currently connected
    pub async fn active_count(&self) -> usize {
        let links: Vec<SharedConnection> = self.links.read().await.values().cloned().collect();
        links.iter().filter(|c| lock(c).is_active()).count()
    }
}
