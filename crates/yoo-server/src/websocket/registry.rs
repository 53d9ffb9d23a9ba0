//! Concurrent map of connected clients.

use std::sync::Arc;

use dashmap::DashMap;
use yoo_auth::UserId;

use super::client::{Client, ClientKey};

/// Every connected client, keyed by slot and generation.
#[derive(Default)]
pub struct ConnectionRegistry {
    clients: DashMap<ClientKey, Arc<Client>>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a client. Returns `false` if the key was already present.
    pub fn register(&self, key: ClientKey, client: Arc<Client>) -> bool {
        self.clients.insert(key, client).is_none()
    }

    /// Remove a client. A missing key is a no-op that returns `false`.
    pub fn unregister(&self, key: &ClientKey) -> bool {
        self.clients.remove(key).is_some()
    }

    /// Whether `key` is registered.
    pub fn contains(&self, key: &ClientKey) -> bool {
        self.clients.contains_key(key)
    }

    /// Number of registered clients.
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Whether no client is registered.
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Snapshot of registered keys.
    pub fn keys(&self) -> Vec<ClientKey> {
        self.clients.iter().map(|entry| *entry.key()).collect()
    }

    /// Snapshot of registered clients.
    pub fn clients(&self) -> Vec<Arc<Client>> {
        self.clients.iter().map(|entry| Arc::clone(entry.value())).collect()
    }

    /// Identities of the registered clients.
    ///
    /// Takes each client's lock in turn, so the snapshot is not atomic.
    pub async fn user_ids(&self) -> Vec<UserId> {
        let mut ids = Vec::new();
        for client in self.clients() {
            if let Some(id) = client.user_id().await {
                ids.push(id);
            }
        }
        ids
    }
}
