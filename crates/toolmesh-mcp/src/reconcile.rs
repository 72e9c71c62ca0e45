use crate::config::{fingerprint, parse_config, ServerDescriptor};
use crate::connection::ServerConnection;
use crate::registry::{close_each, ConnectionRegistry};
use crate::transport::TransportConnector;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock, RwLockReadGuard};
use toolmesh_core::ToolMeshResult;
use tracing::{debug, info, warn};

/// What a call to [`ConfigReconciler::reconcile`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The fingerprint matched; nothing was touched.
    Unchanged,
    /// The registry was torn down and rebuilt.
    Rebuilt {
        /// Display names now in the registry.
        connected: Vec<String>,
        /// Labels of enabled servers that could not be provisioned.
        failed: Vec<String>,
    },
}

/// Keeps the registry in step with the declarative configuration.
///
/// A rebuild holds the generation gate for writing from teardown to publish.
/// Readers pin the gate with [`pin`](Self::pin), so they see either the old
/// generation or the complete new one, never an empty or partial registry.
pub struct ConfigReconciler {
    registry: Arc<ConnectionRegistry>,
    connector: Arc<dyn TransportConnector>,
    lock: Mutex<()>,
    gate: RwLock<()>,
}

impl ConfigReconciler {
    /// Reconciles into `registry`, opening sessions through `connector`.
    pub fn new(registry: Arc<ConnectionRegistry>, connector: Arc<dyn TransportConnector>) -> Self {
        Self {
            registry,
            connector,
            lock: Mutex::new(()),
            gate: RwLock::new(()),
        }
    }

    /// The registry this reconciler maintains.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Applies `raw` if it differs semantically from the applied configuration.
    ///
    /// A parse failure leaves the current registry untouched and is returned
    /// as [`ToolMeshError::ConfigParse`](toolmesh_core::ToolMeshError::ConfigParse).
    /// Servers that fail to connect are logged and left out; they never abort
    /// the rebuild.
    pub async fn reconcile(&self, raw: &str) -> ToolMeshResult<ReconcileOutcome> {
        let _guard = self.lock.lock().await;

        let config = parse_config(raw).inspect_err(|e| {
            warn!(error = %e, "Invalid MCP configuration, keeping current connections");
        })?;

        let new_fingerprint = fingerprint(raw);
        if self.registry.fingerprint().await.as_deref() == Some(new_fingerprint.as_str()) {
            debug!("MCP configuration unchanged");
            return Ok(ReconcileOutcome::Unchanged);
        }

        let _rebuilding = self.gate.write().await;
        let stale = self.registry.replace(Some(new_fingerprint)).await;
        if !stale.is_empty() {
            let failures = close_each(stale).await;
            debug!(failures, "Closed previous MCP connections");
        }

        let mut ready = Vec::new();
        let mut failed = Vec::new();
        for descriptor in config.enabled_servers() {
            match self.provision(descriptor).await {
                Some(conn) => ready.push(conn),
                None => failed.push(descriptor.label().to_string()),
            }
        }

        let connected = self.registry.publish(ready).await;
        let generation = self.registry.generation().await;
        info!(
            generation,
            connected = connected.len(),
            failed = failed.len(),
            "MCP registry rebuilt"
        );
        Ok(ReconcileOutcome::Rebuilt { connected, failed })
    }

    async fn provision(&self, descriptor: &ServerDescriptor) -> Option<ServerConnection> {
        let mut conn = ServerConnection::new(descriptor.clone(), Arc::clone(&self.connector));

        let loaded = match conn.connect().await {
            Ok(()) => conn.load_tools().await,
            Err(e) => Err(e),
        };

        match loaded {
            Ok(()) => Some(conn),
            Err(e) => {
                warn!(server = %conn.name(), error = %e, "MCP server unavailable, skipping");
                if let Err(close_err) = conn.close().await {
                    debug!(server = %conn.name(), error = %close_err, "Close after failed provisioning");
                }
                None
            }
        }
    }

    /// Holds the current generation in place until the guard is dropped.
    ///
    /// A rebuild that starts meanwhile waits for every outstanding guard.
    pub async fn pin(&self) -> RwLockReadGuard<'_, ()> {
        self.gate.read().await
    }

    /// Closes every connection and forgets the applied configuration, so the
    /// next reconcile rebuilds from scratch.
    pub async fn reset(&self) -> usize {
        let _guard = self.lock.lock().await;
        let _rebuilding = self.gate.write().await;
        self.registry.clear().await
    }
}
