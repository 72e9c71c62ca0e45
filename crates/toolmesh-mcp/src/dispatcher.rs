use crate::config::ConfigSource;
use crate::normalize::ContentNormalizer;
use crate::reconcile::ConfigReconciler;
use std::sync::Arc;
use toolmesh_core::{ContentSegment, InvocationRequest, ToolMeshError};
use tracing::{debug, warn};

/// Runs a batch of tool calls against the registry.
///
/// Every request yields its own run of segments. Failures become text
/// segments in place and never stop the rest of the batch.
pub struct BatchDispatcher {
    reconciler: Arc<ConfigReconciler>,
    source: Arc<dyn ConfigSource>,
}

impl BatchDispatcher {
    /// Dispatches against `reconciler`'s registry, reading config from `source`.
    pub fn new(reconciler: Arc<ConfigReconciler>, source: Arc<dyn ConfigSource>) -> Self {
        Self { reconciler, source }
    }

    /// Reconciles, then executes `requests` sequentially in input order.
    ///
    /// The whole batch runs against one registry generation; a rebuild
    /// triggered meanwhile waits for the batch to finish.
    pub async fn dispatch(&self, requests: &[InvocationRequest]) -> Vec<ContentSegment> {
        if let Err(e) = self.reconciler.reconcile(&self.source.current()).await {
            debug!(error = %e, "Dispatching against previous MCP configuration");
        }
        let _generation = self.reconciler.pin().await;

        let mut segments = Vec::new();
        for request in requests {
            segments.extend(self.dispatch_one(request).await);
        }
        segments
    }

    async fn dispatch_one(&self, request: &InvocationRequest) -> Vec<ContentSegment> {
        let Some((server, tool)) = request.target() else {
            let details = serde_json::to_string(request).unwrap_or_default();
            return vec![failure(ToolMeshError::MalformedRequest(details).to_string())];
        };
        let params = request.params_json();

        let Some(conn) = self.reconciler.registry().get(server).await else {
            return vec![failure(
                ToolMeshError::UnknownServer {
                    server: server.to_string(),
                    tool: tool.to_string(),
                    params,
                }
                .to_string(),
            )];
        };

        let outcome = {
            let mut conn = conn.lock().await;
            conn.call_tool(tool, &request.params).await
        };

        match outcome {
            Ok(result) if result.is_error => vec![failure(
                ToolMeshError::ToolExecution {
                    server: server.to_string(),
                    tool: tool.to_string(),
                    params,
                }
                .to_string(),
            )],
            Ok(result) => {
                if result.content.is_empty() {
                    debug!(server, tool, params = %params, "MCP tool returned no content");
                }
                ContentNormalizer::normalize_all(server, tool, &result.content)
            }
            Err(e) => vec![failure(format!(
                "Error calling or processing MCP tool [{server}.{tool}]: {e}. Params: {params}"
            ))],
        }
    }
}

fn failure(text: String) -> ContentSegment {
    warn!("{text}");
    ContentSegment::text(text)
}
