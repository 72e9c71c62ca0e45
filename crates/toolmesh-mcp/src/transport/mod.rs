//! Transport seam between a [`ServerConnection`](crate::ServerConnection) and
//! the wire.
//!
//! A connection never talks HTTP directly: it asks a [`TransportConnector`]
//! for a fresh [`McpTransport`] on every (re)connect and exchanges JSON-RPC
//! messages through it. The stock implementation is [`SseConnector`].

/// HTTP + Server-Sent Events transport.
pub mod sse;

pub use sse::{SseConnector, SseEvent, SseParser, SseTransport};

use crate::protocol::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
use async_trait::async_trait;
use std::collections::HashMap;
use toolmesh_core::ToolMeshResult;

/// An open, bidirectional JSON-RPC session with one MCP server.
#[async_trait]
pub trait McpTransport: Send + Sync {
    /// Sends a request and waits for the response carrying the same id.
    ///
    /// Fails with [`ToolMeshError::StreamClosed`](toolmesh_core::ToolMeshError::StreamClosed)
    /// when the underlying stream went away before the response arrived.
    async fn request(&self, request: JsonRpcRequest) -> ToolMeshResult<JsonRpcResponse>;

    /// Sends a notification. No response is expected.
    async fn notify(&self, notification: JsonRpcNotification) -> ToolMeshResult<()>;

    /// Releases every resource held by the transport.
    async fn close(&self) -> ToolMeshResult<()>;

    /// Whether the stream is still believed to be open.
    fn is_connected(&self) -> bool;
}

/// Factory for transports. One call per connect attempt.
#[async_trait]
pub trait TransportConnector: Send + Sync {
    /// Opens a transport to `endpoint`, sending `headers` with every HTTP request.
    async fn open(
        &self,
        endpoint: &str,
        headers: &HashMap<String, String>,
    ) -> ToolMeshResult<Box<dyn McpTransport>>;
}
