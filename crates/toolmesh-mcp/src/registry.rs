use crate::connection::ServerConnection;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

/// A registry entry. Callers lock it for the duration of one operation, so a
/// teardown waits for an in-flight call on the same connection to finish.
pub type SharedConnection = Arc<Mutex<ServerConnection>>;

#[derive(Default)]
struct Generation {
    connections: HashMap<String, SharedConnection>,
    order: Vec<String>,
    fingerprint: Option<String>,
    number: u64,
}

/// Name-to-connection map of the currently applied configuration.
///
/// The map is replaced wholesale on every configuration change; entries are
/// never patched in place. Iteration follows the order servers were published.
#[derive(Default)]
pub struct ConnectionRegistry {
    current: RwLock<Generation>,
}

impl ConnectionRegistry {
    /// An empty registry with no applied configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up a connection by display name.
    pub async fn get(&self, name: &str) -> Option<SharedConnection> {
        self.current.read().await.connections.get(name).cloned()
    }

    /// Display names in publication order.
    pub async fn names(&self) -> Vec<String> {
        self.current.read().await.order.clone()
    }

    /// All entries in publication order. The map lock is not held afterwards.
    pub async fn snapshot(&self) -> Vec<(String, SharedConnection)> {
        let current = self.current.read().await;
        current
            .order
            .iter()
            .filter_map(|name| {
                current
                    .connections
                    .get(name)
                    .map(|conn| (name.clone(), Arc::clone(conn)))
            })
            .collect()
    }

    /// Number of registered connections.
    pub async fn len(&self) -> usize {
        self.current.read().await.connections.len()
    }

    /// Whether no connection is registered.
    pub async fn is_empty(&self) -> bool {
        self.current.read().await.connections.is_empty()
    }

    /// Fingerprint of the configuration this generation was built from.
    pub async fn fingerprint(&self) -> Option<String> {
        self.current.read().await.fingerprint.clone()
    }

    /// Monotonic counter bumped on every [`replace`](Self::replace).
    pub async fn generation(&self) -> u64 {
        self.current.read().await.number
    }

    /// Starts a new, empty generation tagged with `fingerprint` and hands back
    /// the previous entries for the caller to close.
    pub async fn replace(&self, fingerprint: Option<String>) -> Vec<SharedConnection> {
        let mut current = self.current.write().await;
        let mut previous = std::mem::take(&mut current.connections);
        let order = std::mem::take(&mut current.order);
        current.fingerprint = fingerprint;
        current.number += 1;
        drop(current);

        order
            .iter()
            .filter_map(|name| previous.remove(name))
            .collect()
    }

    /// Adds freshly connected servers to the current generation.
    ///
    /// A server whose display name is already taken replaces the earlier
    /// entry, which is closed. Returns the published names.
    pub async fn publish(&self, connections: Vec<ServerConnection>) -> Vec<String> {
        let mut displaced = Vec::new();
        let mut published = Vec::with_capacity(connections.len());
        {
            let mut current = self.current.write().await;
            for conn in connections {
                let name = conn.name().to_string();
                let entry = Arc::new(Mutex::new(conn));
                match current.connections.insert(name.clone(), entry) {
                    Some(old) => {
                        warn!(server = %name, "Duplicate MCP server name, replacing earlier connection");
                        displaced.push(old);
                    }
                    None => {
                        current.order.push(name.clone());
                        published.push(name);
                    }
                }
            }
        }

        close_each(displaced).await;
        published
    }

    /// Closes every connection and forgets the applied fingerprint.
    pub async fn clear(&self) -> usize {
        let stale = self.replace(None).await;
        let count = stale.len();
        close_each(stale).await;
        info!(closed = count, "MCP registry cleared");
        count
    }
}

/// Closes each connection in turn, logging failures. Returns how many failed.
pub async fn close_each(connections: Vec<SharedConnection>) -> usize {
    let mut failures = 0;
    for conn in connections {
        let mut conn = conn.lock().await;
        if let Err(e) = conn.close().await {
            warn!(server = %conn.name(), error = %e, "Failed to close MCP connection");
            failures += 1;
        }
    }
    failures
}
