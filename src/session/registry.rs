use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tokio::sync::{oneshot, RwLock};

use super::ClientId;

/// Fires when the registry releases a client's connection handle.
pub type ClosedSignal = oneshot::Receiver<()>;

/// Registry entry owning a client's connection handle
struct ClientEntry {
    info: ClientInfo,
    /// Dropping or firing this closes the connection's loops
    close: Option<oneshot::Sender<()>>,
}

/// Public view of a connected client
#[derive(Debug, Clone, Serialize)]
pub struct ClientInfo {
    pub id: ClientId,
    /// Label supplied by the client in the connect path, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Remote address of the connection, if known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peer: Option<String>,
    pub joined_at: DateTime<Utc>,
}

/// Tracks connected clients
pub struct SessionRegistry {
    clients: RwLock<HashMap<ClientId, ClientEntry>>,
    next_id: AtomicU64,
    max_clients: usize,
}

impl SessionRegistry {
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            max_clients,
        }
    }

    /// Register a new connection.
    ///
    /// Returns the assigned id and the signal that fires once the client is
    /// unregistered, or `CapacityExceeded` when `max_clients` is reached.
    pub async fn register(
        &self,
        label: Option<String>,
        peer: Option<String>,
    ) -> Result<(ClientId, ClosedSignal), SessionError> {
        let mut clients = self.clients.write().await;
        if clients.len() >= self.max_clients {
            return Err(SessionError::CapacityExceeded {
                limit: self.max_clients,
            });
        }

        let id = ClientId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (close_tx, close_rx) = oneshot::channel();
        let info = ClientInfo {
            id,
            label,
            peer,
            joined_at: Utc::now(),
        };

        clients.insert(
            id,
            ClientEntry {
                info,
                close: Some(close_tx),
            },
        );

        tracing::info!(client_id = %id, active = clients.len(), "Client registered");
        Ok((id, close_rx))
    }

    /// Remove a client and release its connection handle.
    ///
    /// Unregistering an unknown or already removed client is a no-op.
    pub async fn unregister(&self, id: ClientId) -> bool {
        let entry = self.clients.write().await.remove(&id);

        match entry {
            Some(mut entry) => {
                if let Some(close) = entry.close.take() {
                    let _ = close.send(());
                }
                tracing::info!(client_id = %id, "Client unregistered");
                true
            }
            None => false,
        }
    }

    /// Ids of every connected client
    pub async fn list_active(&self) -> BTreeSet<ClientId> {
        self.clients.read().await.keys().copied().collect()
    }

    /// Details of every connected client, oldest first
    pub async fn clients(&self) -> Vec<ClientInfo> {
        let mut infos: Vec<_> = self
            .clients
            .read()
            .await
            .values()
            .map(|e| e.info.clone())
            .collect();
        infos.sort_by_key(|info| info.id);
        infos
    }

    pub async fn get(&self, id: ClientId) -> Option<ClientInfo> {
        self.clients.read().await.get(&id).map(|e| e.info.clone())
    }

    pub async fn contains(&self, id: ClientId) -> bool {
        self.clients.read().await.contains_key(&id)
    }

    pub async fn count(&self) -> usize {
        self.clients.read().await.len()
    }

    pub fn max_clients(&self) -> usize {
        self.max_clients
    }
}

/// Errors that can occur in the session registry
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Too many clients connected (limit: {limit})")]
    CapacityExceeded { limit: usize },
}
