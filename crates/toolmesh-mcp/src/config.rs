//! Declarative server configuration: parsing, canonical fingerprinting and
//! delivery of the current text to the reconciler.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use toolmesh_core::{ToolMeshError, ToolMeshResult};

/// Template written for hosts that have no configuration yet.
pub const DEFAULT_CONFIG: &str = r#"{
  // MCP servers reachable over SSE. Set "enabled" to true to connect.
  "servers": [
    {
      "endpoint": "http://localhost:8000/sse",
      "description": "Local MCP server",
      "enabled": false,
      // "name": "local",
      // "headers": {"X-Api-Key": "..."},
      // "auth_token": "...",
    },
    {
      "endpoint": "https://mcp.example.com/sse",
      "description": "Remote MCP server",
      "enabled": false,
    },
  ],
}
"#;

/// Declared configuration for one remote MCP server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerDescriptor {
    /// Local name; replaced by the server's self-reported name after the handshake.
    #[serde(default)]
    pub name: Option<String>,
    /// SSE endpoint URL.
    #[serde(default)]
    pub endpoint: String,
    /// Disabled servers are never contacted.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Free text shown in the tool catalog.
    #[serde(default)]
    pub description: String,
    /// Extra HTTP headers sent on every transport request.
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Passed through as `Authorization: Bearer <token>`.
    #[serde(default)]
    pub auth_token: Option<String>,
}

fn default_enabled() -> bool {
    true
}

impl ServerDescriptor {
    /// Creates an enabled descriptor for `endpoint` with everything else defaulted.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            name: None,
            endpoint: endpoint.into(),
            enabled: true,
            description: String::new(),
            headers: HashMap::new(),
            auth_token: None,
        }
    }

    /// Name used for logging before a handshake has reported one.
    pub fn label(&self) -> &str {
        match self.name.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ if !self.endpoint.is_empty() => &self.endpoint,
            _ => "<unnamed>",
        }
    }

    /// The configured headers plus the bearer token, if any.
    pub fn transport_headers(&self) -> HashMap<String, String> {
        let mut headers = self.headers.clone();
        if let Some(token) = self.auth_token.as_deref().filter(|t| !t.is_empty()) {
            headers.insert("Authorization".to_string(), format!("Bearer {token}"));
        }
        headers
    }
}

/// The whole declarative configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct McpConfig {
    /// Declared servers, in catalog order.
    #[serde(default)]
    pub servers: Vec<ServerDescriptor>,
}

impl McpConfig {
    /// Descriptors with `enabled = true`, in declaration order.
    pub fn enabled_servers(&self) -> impl Iterator<Item = &ServerDescriptor> {
        self.servers.iter().filter(|s| s.enabled)
    }
}

/// Parses JSON5-tolerant text (comments, trailing commas) into a config.
pub fn parse_config(raw: &str) -> ToolMeshResult<McpConfig> {
    let value: serde_json::Value =
        json5::from_str(raw).map_err(|e| ToolMeshError::ConfigParse(e.to_string()))?;
    serde_json::from_value(value).map_err(|e| ToolMeshError::ConfigParse(e.to_string()))
}

/// Compact JSON with object keys sorted recursively.
pub fn canonicalize(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let body: Vec<String> = keys
                .into_iter()
                .map(|k| {
                    format!(
                        "{}:{}",
                        serde_json::Value::String(k.clone()),
                        canonicalize(&map[k])
                    )
                })
                .collect();
            format!("{{{}}}", body.join(","))
        }
        serde_json::Value::Array(items) => {
            let body: Vec<String> = items.iter().map(canonicalize).collect();
            format!("[{}]", body.join(","))
        }
        scalar => scalar.to_string(),
    }
}

/// SHA-256 of the canonical form of `raw`.
///
/// Formatting, comments and key order do not change the result. Text that
/// does not parse is hashed verbatim.
pub fn fingerprint(raw: &str) -> String {
    let canonical = match json5::from_str::<serde_json::Value>(raw) {
        Ok(value) => canonicalize(&value),
        Err(_) => raw.to_string(),
    };
    hex::encode(Sha256::digest(canonical.as_bytes()))
}

/// Where the reconciler reads the host's current configuration text from.
pub trait ConfigSource: Send + Sync {
    /// The configuration text as it is right now.
    fn current(&self) -> String;
}

/// An in-memory, replaceable configuration text.
#[derive(Debug, Default)]
pub struct SharedConfig {
    text: RwLock<String>,
}

impl SharedConfig {
    /// Starts out holding `text`.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: RwLock::new(text.into()),
        }
    }

    /// Replaces the text; the next reconcile picks it up.
    pub fn set(&self, text: impl Into<String>) {
        *self.text.write() = text.into();
    }
}

impl ConfigSource for SharedConfig {
    fn current(&self) -> String {
        self.text.read().clone()
    }
}

impl ConfigSource for String {
    fn current(&self) -> String {
        self.clone()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_applies_defaults() {
        let config = parse_config(r#"{"servers":[{"endpoint":"http://a"}]}"#).unwrap();
        let server = &config.servers[0];
        assert!(server.enabled);
        assert!(server.name.is_none());
        assert!(server.description.is_empty());
        assert!(server.headers.is_empty());
    }

    #[test]
    fn test_parse_tolerates_comments_and_trailing_commas() {
        let config = parse_config(DEFAULT_CONFIG).unwrap();
        assert_eq!(config.servers.len(), 2);
        assert_eq!(config.enabled_servers().count(), 0);
    }

    #[test]
    fn test_parse_failure_is_config_error() {
        let err = parse_config(r#"{"servers": [ {"endpoint": }"#).unwrap_err();
        assert!(matches!(err, ToolMeshError::ConfigParse(_)));

        let err = parse_config(r#"{"servers": "nope"}"#).unwrap_err();
        assert!(matches!(err, ToolMeshError::ConfigParse(_)));
    }

    #[test]
    fn test_missing_servers_key_is_empty() {
        assert!(parse_config("{}").unwrap().servers.is_empty());
    }

    #[test]
    fn test_fingerprint_ignores_formatting_and_key_order() {
        let a = r#"{"servers":[{"endpoint":"http://a","enabled":true}]}"#;
        let b = "{\n  // same thing\n  servers: [ { enabled: true, endpoint: 'http://a', }, ],\n}";
        assert_eq!(fingerprint(a), fingerprint(b));

        let c = r#"{"servers":[{"endpoint":"http://a","enabled":false}]}"#;
        assert_ne!(fingerprint(a), fingerprint(c));
    }

    #[test]
    fn test_fingerprint_falls_back_to_raw_text() {
        assert_eq!(fingerprint("{not json"), fingerprint("{not json"));
        assert_ne!(fingerprint("{not json"), fingerprint("{not  json"));
        assert_eq!(fingerprint("x").len(), 64);
    }

    #[test]
    fn test_canonicalize_sorts_nested_keys() {
        let value = serde_json::json!({"b": [{"z": 1, "a": "x"}], "a": null});
        assert_eq!(canonicalize(&value), r#"{"a":null,"b":[{"a":"x","z":1}]}"#);
    }

    #[test]
    fn test_auth_token_becomes_bearer_header() {
        let mut server = ServerDescriptor::new("http://a");
        server.headers.insert("X-Trace".into(), "1".into());
        server.auth_token = Some("s3cret".into());
        let headers = server.transport_headers();
        assert_eq!(headers["Authorization"], "Bearer s3cret");
        assert_eq!(headers["X-Trace"], "1");
    }

    #[test]
    fn test_label_prefers_name() {
        let mut server = ServerDescriptor::new("http://a");
        assert_eq!(server.label(), "http://a");
        server.name = Some("alpha".into());
        assert_eq!(server.label(), "alpha");
    }

    #[test]
    fn test_shared_config_replacement() {
        let shared = SharedConfig::new("{}");
        assert_eq!(shared.current(), "{}");
        shared.set(DEFAULT_CONFIG);
        assert_eq!(shared.current(), DEFAULT_CONFIG);
    }
}
