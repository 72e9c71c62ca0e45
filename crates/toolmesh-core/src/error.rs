use thiserror::Error;

/// A convenience `Result` alias using [`ToolMeshError`].
pub type ToolMeshResult<T> = Result<T, ToolMeshError>;

/// Top-level error type for toolmesh.
///
/// Connection-level variants propagate to callers; the batch-level variants
/// (`ToolExecution`, `UnknownServer`, `MalformedRequest`) are rendered into
/// text segments by the dispatcher and never escape a batch.
#[derive(Error, Debug)]
pub enum ToolMeshError {
    /// The declarative server configuration could not be parsed.
    #[error("Config parse error: {0}")]
    ConfigParse(String),

    /// Opening the transport or performing the handshake failed.
    #[error("Failed to connect MCP server [{server}]: {reason}")]
    Connect {
        /// Configured or reported server name.
        server: String,
        /// What went wrong.
        reason: String,
    },

    /// A call was attempted with no live session.
    #[error("MCP server [{server}] is not connected")]
    NotConnected {
        /// Server display name.
        server: String,
    },

    /// The underlying stream was closed out from under the session.
    ///
    /// This is the only condition that triggers a reconnect-and-retry.
    #[error("Stream to MCP server [{server}] closed: {reason}")]
    StreamClosed {
        /// Server display name or endpoint.
        server: String,
        /// What closed the stream.
        reason: String,
    },

    /// Any other transport failure (HTTP status, socket error, ...).
    #[error("Transport error: {0}")]
    Transport(String),

    /// The server answered with a JSON-RPC error object.
    #[error("MCP error {code}: {message}")]
    Rpc {
        /// JSON-RPC error code.
        code: i64,
        /// Server-supplied message.
        message: String,
    },

    /// The server answered with a payload that does not match the protocol.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A transport task was cancelled by a task other than its owner.
    #[error("Transport task cancelled: {0}")]
    Cancelled(String),

    /// The remote tool reported a failure in its result.
    #[error("MCP tool [{server}.{tool}] reported an error. Params: {params}")]
    ToolExecution {
        /// Server display name.
        server: String,
        /// Tool name.
        tool: String,
        /// Call arguments as JSON.
        params: String,
    },

    /// The batch named a server that is not in the registry.
    #[error("MCP service [{server}] not found or not enabled. Tool: {tool}, params: {params}")]
    UnknownServer {
        /// Requested server name.
        server: String,
        /// Requested tool name.
        tool: String,
        /// Call arguments as JSON.
        params: String,
    },

    /// A batch entry lacked `server_name` or `tool_name`.
    #[error("Skipped MCP call: 'server_name' or 'tool_name' missing. Details: {0}")]
    MalformedRequest(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ToolMeshError {
    /// Whether this error is the recoverable stream-closed condition.
    pub fn is_stream_closed(&self) -> bool {
        matches!(self, Self::StreamClosed { .. })
    }

    /// Whether this error is the cross-task cancellation class tolerated on close.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }

    /// Shorthand for a [`ToolMeshError::StreamClosed`].
    pub fn stream_closed(server: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::StreamClosed {
            server: server.into(),
            reason: reason.into(),
        }
    }
}
