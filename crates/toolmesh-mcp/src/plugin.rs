use crate::catalog::render_tool_catalog;
use crate::config::ConfigSource;
use crate::dispatcher::BatchDispatcher;
use crate::reconcile::{ConfigReconciler, ReconcileOutcome};
use crate::registry::ConnectionRegistry;
use crate::transport::{SseConnector, TransportConnector};
use std::sync::Arc;
use toolmesh_core::{ContentSegment, InvocationRequest, ToolMeshResult};
use tracing::{info, warn};

/// Host-facing entry points: lifecycle hooks, prompt injection and batch calls.
///
/// Owns one registry generation chain. Hosts create one plugin per agent
/// runtime and call [`cleanup`](Self::cleanup) on unload.
pub struct McpToolsPlugin {
    source: Arc<dyn ConfigSource>,
    registry: Arc<ConnectionRegistry>,
    reconciler: Arc<ConfigReconciler>,
    dispatcher: BatchDispatcher,
}

impl McpToolsPlugin {
    /// A plugin talking to real servers over SSE.
    pub fn new(source: Arc<dyn ConfigSource>) -> Self {
        Self::with_connector(source, Arc::new(SseConnector::new()))
    }

    /// A plugin opening sessions through `connector`.
    pub fn with_connector(
        source: Arc<dyn ConfigSource>,
        connector: Arc<dyn TransportConnector>,
    ) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let reconciler = Arc::new(ConfigReconciler::new(Arc::clone(&registry), connector));
        let dispatcher = BatchDispatcher::new(Arc::clone(&reconciler), Arc::clone(&source));
        Self {
            source,
            registry,
            reconciler,
            dispatcher,
        }
    }

    /// The live registry.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Applies the current configuration text.
    pub async fn reconcile(&self) -> ToolMeshResult<ReconcileOutcome> {
        self.reconciler.reconcile(&self.source.current()).await
    }

    /// Load hook. Configuration errors are logged, never raised.
    pub async fn init(&self) {
        match self.reconcile().await {
            Ok(ReconcileOutcome::Rebuilt { connected, failed }) => {
                info!(connected = ?connected, failed = ?failed, "MCP tools plugin initialized");
            }
            Ok(ReconcileOutcome::Unchanged) => {}
            Err(e) => warn!(error = %e, "MCP tools plugin initialized without configuration"),
        }
    }

    /// Reconciles, then renders the tool catalog for the agent prompt.
    pub async fn prompt_inject(&self) -> String {
        if let Err(e) = self.reconcile().await {
            warn!(error = %e, "Rendering MCP catalog from previous configuration");
        }
        let _generation = self.reconciler.pin().await;
        render_tool_catalog(&self.registry).await
    }

    /// Runs a batch of tool calls.
    pub async fn call_tools(&self, requests: &[InvocationRequest]) -> Vec<ContentSegment> {
        self.dispatcher.dispatch(requests).await
    }

    /// [`call_tools`](Self::call_tools) over loosely-typed dictionaries, returning wire-form segments.
    pub async fn call_tools_json(&self, calls: &[serde_json::Value]) -> Vec<serde_json::Value> {
        let requests: Vec<InvocationRequest> =
            calls.iter().map(InvocationRequest::from_value).collect();
        self.call_tools(&requests)
            .await
            .iter()
            .map(ContentSegment::to_wire)
            .collect()
    }

    /// Unload hook: closes every connection and forgets the applied configuration.
    pub async fn cleanup(&self) {
        let closed = self.reconciler.reset().await;
        info!(closed, "MCP tools plugin cleaned up");
    }
}
