//! One streaming session to one MCP server.

use crate::config::ServerDescriptor;
use crate::protocol::*;
use crate::transport::{McpTransport, TransportConnector};
use serde::de::DeserializeOwned;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use toolmesh_core::{Params, ToolMeshError, ToolMeshResult};
use tracing::{debug, error, info, warn};

/// Client name announced during the handshake.
pub const CLIENT_NAME: &str = "toolmesh";

/// Lifecycle state of a [`ServerConnection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No session; the initial state and the state after `close`.
    Disconnected,
    /// Transport open or handshake in progress.
    Connecting,
    /// Handshake done, tools not loaded yet.
    Connected,
    /// Ready for calls.
    ToolsLoaded,
    /// The last connect attempt failed.
    Failed,
}

/// Owns the session to one server: connect, list tools, call, reconnect, close.
///
/// A session handle exists exactly while the state is `Connected` or
/// `ToolsLoaded`. The tool list is replaced wholesale on every load.
pub struct ServerConnection {
    descriptor: ServerDescriptor,
    display_name: String,
    state: ConnectionState,
    tools: Vec<ToolDescriptor>,
    session: Option<Box<dyn McpTransport>>,
    connector: Arc<dyn TransportConnector>,
    next_id: AtomicU64,
}

impl ServerConnection {
    /// A disconnected connection for `descriptor`. Nothing is opened yet.
    pub fn new(descriptor: ServerDescriptor, connector: Arc<dyn TransportConnector>) -> Self {
        let display_name = descriptor.label().to_string();
        Self {
            descriptor,
            display_name,
            state: ConnectionState::Disconnected,
            tools: Vec::new(),
            session: None,
            connector,
            next_id: AtomicU64::new(1),
        }
    }

    /// Display name: the server-reported name once connected.
    pub fn name(&self) -> &str {
        &self.display_name
    }

    /// The configuration this connection was built from.
    pub fn descriptor(&self) -> &ServerDescriptor {
        &self.descriptor
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Tools from the last successful load.
    pub fn tools(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    /// Whether a session handle is held.
    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Opens the transport and performs the MCP handshake.
    ///
    /// On failure every partially opened resource is released, the state
    /// becomes `Failed` and a [`ToolMeshError::Connect`] is returned.
    pub async fn connect(&mut self) -> ToolMeshResult<()> {
        if self.session.is_some() {
            return Ok(());
        }
        self.state = ConnectionState::Connecting;

        if self.descriptor.endpoint.trim().is_empty() {
            return Err(self.fail("no endpoint configured".to_string()));
        }

        let headers = self.descriptor.transport_headers();
        let transport = match self.connector.open(&self.descriptor.endpoint, &headers).await {
            Ok(transport) => transport,
            Err(e) => return Err(self.fail(e.to_string())),
        };

        let init = match self.handshake(transport.as_ref()).await {
            Ok(init) => init,
            Err(e) => {
                if let Err(close_err) = transport.close().await {
                    debug!(server = %self.display_name, error = %close_err, "Transport close after failed handshake");
                }
                return Err(self.fail(e.to_string()));
            }
        };

        if let Some(reported) = init.server_info.map(|info| info.name) {
            if !reported.is_empty() {
                self.display_name = reported;
            }
        }
        self.session = Some(transport);
        self.state = ConnectionState::Connected;

        info!(
            server = %self.display_name,
            endpoint = %self.descriptor.endpoint,
            version = %init.protocol_version,
            "MCP server connected"
        );
        Ok(())
    }

    async fn handshake(&self, transport: &dyn McpTransport) -> ToolMeshResult<InitializeResult> {
        let params = serde_json::json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": CLIENT_NAME,
                "version": env!("CARGO_PKG_VERSION"),
            }
        });
        let init: InitializeResult = rpc(transport, self.next_id(), "initialize", Some(params)).await?;
        transport
            .notify(JsonRpcNotification::new("notifications/initialized", None))
            .await?;
        Ok(init)
    }

    fn fail(&mut self, reason: String) -> ToolMeshError {
        self.state = ConnectionState::Failed;
        error!(server = %self.display_name, endpoint = %self.descriptor.endpoint, error = %reason, "MCP connect failed");
        ToolMeshError::Connect {
            server: self.display_name.clone(),
            reason,
        }
    }

    /// Fetches the tool catalog. Does nothing when not connected.
    pub async fn load_tools(&mut self) -> ToolMeshResult<()> {
        let Some(session) = self.session.as_deref() else {
            debug!(server = %self.display_name, "Skipping tool load, not connected");
            return Ok(());
        };

        let result: ListToolsResult = rpc(
            session,
            self.next_id(),
            "tools/list",
            Some(serde_json::json!({})),
        )
        .await
        .map_err(|e| self.relabel(e))?;

        self.tools = result.tools;
        self.state = ConnectionState::ToolsLoaded;
        info!(server = %self.display_name, tools = self.tools.len(), "MCP tools loaded");
        Ok(())
    }

    /// Calls a tool, reconnecting and retrying exactly once if the stream
    /// was closed underneath the session.
    pub async fn call_tool(&mut self, tool: &str, params: &Params) -> ToolMeshResult<CallToolResult> {
        match self.invoke(tool, params).await {
            Err(e) if e.is_stream_closed() => {
                warn!(server = %self.display_name, tool, error = %e, "MCP stream closed, reconnecting");
                self.reconnect().await?;
                self.invoke(tool, params).await
            }
            other => other,
        }
    }

    async fn invoke(&self, tool: &str, params: &Params) -> ToolMeshResult<CallToolResult> {
        let Some(session) = self.session.as_deref() else {
            return Err(ToolMeshError::NotConnected {
                server: self.display_name.clone(),
            });
        };

        let args = serde_json::to_value(CallToolParams {
            name: tool,
            arguments: params,
        })?;
        rpc(session, self.next_id(), "tools/call", Some(args))
            .await
            .map_err(|e| self.relabel(e))
    }

    /// Points a transport-level stream-closed error at this server's name.
    fn relabel(&self, err: ToolMeshError) -> ToolMeshError {
        match err {
            ToolMeshError::StreamClosed { reason, .. } => {
                ToolMeshError::stream_closed(&self.display_name, reason)
            }
            other => other,
        }
    }

    /// Closes the session. A second call is a no-op.
    ///
    /// A cross-task cancellation raised by the transport is logged and
    /// swallowed; every other close error propagates.
    pub async fn close(&mut self) -> ToolMeshResult<()> {
        let Some(session) = self.session.take() else {
            return Ok(());
        };
        self.tools.clear();
        self.state = ConnectionState::Disconnected;

        match session.close().await {
            Ok(()) => {
                debug!(server = %self.display_name, "MCP connection closed");
                Ok(())
            }
            Err(e) if e.is_cancelled() => {
                warn!(server = %self.display_name, error = %e, "Ignoring cancellation while closing MCP connection");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Best-effort close, then connect and reload tools.
    pub async fn reconnect(&mut self) -> ToolMeshResult<()> {
        if let Err(e) = self.close().await {
            warn!(server = %self.display_name, error = %e, "Close failed during reconnect");
        }
        self.connect().await?;
        self.load_tools().await
    }
}

async fn rpc<T: DeserializeOwned>(
    transport: &dyn McpTransport,
    id: u64,
    method: &str,
    params: Option<serde_json::Value>,
) -> ToolMeshResult<T> {
    let resp = transport
        .request(JsonRpcRequest::new(id, method, params))
        .await?;

    if let Some(err) = resp.error {
        return Err(ToolMeshError::Rpc {
            code: err.code,
            message: err.message,
        });
    }

    let result = resp
        .result
        .ok_or_else(|| ToolMeshError::Protocol(format!("'{method}' response has no result")))?;
    serde_json::from_value(result)
        .map_err(|e| ToolMeshError::Protocol(format!("Malformed '{method}' result: {e}")))
}
