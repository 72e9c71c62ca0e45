//! MCP (Model Context Protocol) JSON-RPC 2.0 message types.

use serde::{Deserialize, Serialize};
use toolmesh_core::Params;

/// Protocol revision announced during the handshake.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// JSON-RPC 2.0 request.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    /// Always `"2.0"`.
    pub jsonrpc: &'static str,
    /// Correlates the response on the event stream.
    pub id: u64,
    /// Method name, e.g. `tools/call`.
    pub method: String,
    /// Method parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl JsonRpcRequest {
    /// Builds a request with the given id.
    pub fn new(id: u64, method: impl Into<String>, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method: method.into(),
            params,
        }
    }
}

/// JSON-RPC 2.0 notification (no id, no response).
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcNotification {
    /// Always `"2.0"`.
    pub jsonrpc: &'static str,
    /// Notification name, e.g. `notifications/initialized`.
    pub method: String,
    /// Notification parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl JsonRpcNotification {
    /// Builds a notification.
    pub fn new(method: impl Into<String>, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            method: method.into(),
            params,
        }
    }
}

/// JSON-RPC 2.0 response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// Protocol version echoed by the server.
    #[serde(default)]
    pub jsonrpc: String,
    /// Id of the request this answers.
    pub id: Option<u64>,
    /// Set on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// Set on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// Builds a successful response. Mostly useful for transport doubles.
    pub fn success(id: u64, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: Some(id),
            result: Some(result),
            error: None,
        }
    }
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// JSON-RPC error code.
    pub code: i64,
    /// Human-readable message.
    pub message: String,
    /// Optional structured details.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// Server identity reported by the `initialize` response.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerInfo {
    /// Name the server calls itself.
    pub name: String,
    /// Server version string.
    #[serde(default)]
    pub version: String,
}

/// MCP server capabilities from the `initialize` response.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ServerCapabilities {
    /// Present when the server offers tools.
    #[serde(default)]
    pub tools: Option<serde_json::Value>,
    /// Present when the server offers resources.
    #[serde(default)]
    pub resources: Option<serde_json::Value>,
    /// Present when the server offers prompts.
    #[serde(default)]
    pub prompts: Option<serde_json::Value>,
}

/// MCP initialize response.
#[derive(Debug, Clone, Deserialize)]
pub struct InitializeResult {
    /// Protocol revision the server agreed to.
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    /// Advertised capabilities.
    #[serde(default)]
    pub capabilities: ServerCapabilities,
    /// Server identity, if reported.
    #[serde(default, rename = "serverInfo")]
    pub server_info: Option<ServerInfo>,
}

/// A tool advertised by a server in its `tools/list` response.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ToolDescriptor {
    /// Tool name, unique within its server.
    pub name: String,
    /// What the tool does.
    #[serde(default)]
    pub description: Option<String>,
    /// JSON schema of the tool's arguments.
    #[serde(default = "default_input_schema", rename = "inputSchema")]
    pub input_schema: serde_json::Value,
}

fn default_input_schema() -> serde_json::Value {
    serde_json::json!({"type": "object", "properties": {}})
}

/// One parameter of a tool, flattened out of its JSON schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterSpec {
    /// Property name.
    pub name: String,
    /// JSON schema `type`, empty when absent.
    pub kind: String,
    /// Property description, empty when absent.
    pub description: String,
    /// Listed in the schema's `required` array.
    pub required: bool,
}

impl ToolDescriptor {
    /// Flattens `inputSchema.properties` into parameter specs, ordered by name.
    pub fn parameters(&self) -> Vec<ParameterSpec> {
        let required: Vec<&str> = self
            .input_schema
            .get("required")
            .and_then(serde_json::Value::as_array)
            .map(|names| names.iter().filter_map(serde_json::Value::as_str).collect())
            .unwrap_or_default();

        let Some(properties) = self
            .input_schema
            .get("properties")
            .and_then(serde_json::Value::as_object)
        else {
            return Vec::new();
        };

        properties
            .iter()
            .map(|(name, schema)| ParameterSpec {
                name: name.clone(),
                kind: schema
                    .get("type")
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                description: schema
                    .get("description")
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                required: required.contains(&name.as_str()),
            })
            .collect()
    }
}

/// `tools/list` result.
#[derive(Debug, Clone, Deserialize)]
pub struct ListToolsResult {
    /// Advertised tools.
    #[serde(default)]
    pub tools: Vec<ToolDescriptor>,
}

/// `tools/call` params.
#[derive(Debug, Clone, Serialize)]
pub struct CallToolParams<'a> {
    /// Tool to call.
    pub name: &'a str,
    /// Tool arguments.
    pub arguments: &'a Params,
}

/// `tools/call` result.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallToolResult {
    /// Result blocks in server order.
    #[serde(default, alias = "contents")]
    pub content: Vec<ContentItem>,
    /// The tool itself reported failure.
    #[serde(default, rename = "isError")]
    pub is_error: bool,
}

/// One polymorphic content block of a tool result.
///
/// Decoding never fails: blocks whose tag is not understood end up as
/// [`ContentItem::Unknown`] so a single exotic block cannot poison a result.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "serde_json::Value")]
pub enum ContentItem {
    /// Plain text.
    Text {
        /// The text.
        text: String,
    },
    /// Inline image.
    Image {
        /// Base64 payload.
        data: String,
        /// Declared MIME type.
        mime_type: Option<String>,
    },
    /// Embedded resource with a text body.
    EmbeddedText {
        /// Resource URI.
        uri: Option<String>,
        /// Resource body.
        text: String,
    },
    /// Embedded resource with a base64 body.
    EmbeddedBinary {
        /// Resource URI.
        uri: Option<String>,
        /// Base64 payload.
        blob: String,
        /// Declared MIME type.
        mime_type: Option<String>,
    },
    /// Any block this client does not understand.
    Unknown {
        /// The block's `type` tag.
        kind: String,
    },
}

impl ContentItem {
    /// The content tag as it appeared on the wire, for diagnostics.
    pub fn kind(&self) -> &str {
        match self {
            Self::Text { .. } => "text",
            Self::Image { .. } => "image",
            Self::EmbeddedText { .. } | Self::EmbeddedBinary { .. } => "resource",
            Self::Unknown { kind } => kind,
        }
    }
}

impl From<serde_json::Value> for ContentItem {
    fn from(value: serde_json::Value) -> Self {
        let str_field = |v: &serde_json::Value, key: &str| {
            v.get(key)
                .and_then(serde_json::Value::as_str)
                .map(str::to_string)
        };
        let kind = str_field(&value, "type").unwrap_or_else(|| "<untagged>".to_string());

        match kind.as_str() {
            "text" => match str_field(&value, "text") {
                Some(text) => Self::Text { text },
                None => Self::Unknown { kind },
            },
            "image" => Self::Image {
                data: str_field(&value, "data").unwrap_or_default(),
                mime_type: str_field(&value, "mimeType"),
            },
            "resource" => {
                let resource = value.get("resource").cloned().unwrap_or_default();
                let uri = str_field(&resource, "uri");
                if let Some(text) = str_field(&resource, "text") {
                    Self::EmbeddedText { uri, text }
                } else if let Some(blob) = str_field(&resource, "blob") {
                    Self::EmbeddedBinary {
                        uri,
                        blob,
                        mime_type: str_field(&resource, "mimeType"),
                    }
                } else {
                    Self::Unknown {
                        kind: "resource".to_string(),
                    }
                }
            }
            _ => Self::Unknown { kind },
        }
    }
}
