use serde::{Deserialize, Serialize};

/// Mime type used when a binary payload does not declare one.
pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// Parameter mapping passed to a remote tool.
pub type Params = serde_json::Map<String, serde_json::Value>;

/// A normalized unit of tool output handed back to the agent.
///
/// Serializes to the wire form the agent layer consumes:
/// `{"type": "text", "text": ...}` or `{"type": "image", "image_url": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentSegment {
    /// Plain text.
    Text {
        /// The literal text body.
        text: String,
    },
    /// An image carried inline as a `data:` URI.
    Image {
        /// `data:<mime>;base64,<payload>`
        image_url: String,
    },
}

impl ContentSegment {
    /// Creates a text segment.
    pub fn text(body: impl Into<String>) -> Self {
        Self::Text { text: body.into() }
    }

    /// Creates an image segment from a mime type and a base64 payload.
    ///
    /// A missing or empty mime type falls back to [`DEFAULT_MIME_TYPE`].
    pub fn image(mime_type: Option<&str>, base64_data: &str) -> Self {
        let mime = mime_type
            .filter(|m| !m.is_empty())
            .unwrap_or(DEFAULT_MIME_TYPE);
        Self::Image {
            image_url: format!("data:{mime};base64,{base64_data}"),
        }
    }

    /// Returns the text body, if this is a text segment.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            Self::Image { .. } => None,
        }
    }

    /// Returns the data URI, if this is an image segment.
    pub fn as_image_url(&self) -> Option<&str> {
        match self {
            Self::Image { image_url } => Some(image_url),
            Self::Text { .. } => None,
        }
    }

    /// Serializes the segment to its wire dictionary.
    pub fn to_wire(&self) -> serde_json::Value {
        match self {
            Self::Text { text } => serde_json::json!({"type": "text", "text": text}),
            Self::Image { image_url } => {
                serde_json::json!({"type": "image", "image_url": image_url})
            }
        }
    }
}

/// One entry of a batch tool invocation.
///
/// Both names are optional at the type level so that a malformed entry can
/// still be represented and reported in place instead of failing the batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvocationRequest {
    /// Registry name of the target server.
    #[serde(default)]
    pub server_name: Option<String>,
    /// Name of the tool on that server.
    #[serde(default)]
    pub tool_name: Option<String>,
    /// Arguments passed to the tool.
    #[serde(default)]
    pub params: Params,
}

impl InvocationRequest {
    /// Creates a well-formed request.
    pub fn new(server: impl Into<String>, tool: impl Into<String>, params: Params) -> Self {
        Self {
            server_name: Some(server.into()),
            tool_name: Some(tool.into()),
            params,
        }
    }

    /// Builds a request from a loosely-typed host dictionary.
    ///
    /// Anything that is not an object, or whose name fields are not strings,
    /// yields a request with the offending fields unset.
    pub fn from_value(value: &serde_json::Value) -> Self {
        let field = |key: &str| {
            value
                .get(key)
                .and_then(serde_json::Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        let params = value
            .get("params")
            .and_then(serde_json::Value::as_object)
            .cloned()
            .unwrap_or_default();

        Self {
            server_name: field("server_name"),
            tool_name: field("tool_name"),
            params,
        }
    }

    /// Returns `(server, tool)` when both names are present and non-empty.
    pub fn target(&self) -> Option<(&str, &str)> {
        let server = self.server_name.as_deref().filter(|s| !s.is_empty())?;
        let tool = self.tool_name.as_deref().filter(|s| !s.is_empty())?;
        Some((server, tool))
    }

    /// Renders the params as compact JSON for log lines and error segments.
    pub fn params_json(&self) -> String {
        serde_json::Value::Object(self.params.clone()).to_string()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_image_defaults_mime_type() {
        let seg = ContentSegment::image(None, "AAAA");
        assert_eq!(
            seg.as_image_url(),
            Some("data:application/octet-stream;base64,AAAA")
        );
        let seg = ContentSegment::image(Some(""), "AAAA");
        assert_eq!(
            seg.as_image_url(),
            Some("data:application/octet-stream;base64,AAAA")
        );
    }

    #[test]
    fn test_wire_form() {
        let text = serde_json::to_value(ContentSegment::text("hi")).unwrap();
        assert_eq!(text, serde_json::json!({"type": "text", "text": "hi"}));

        let image = ContentSegment::image(Some("image/png"), "Zm9v");
        assert_eq!(
            serde_json::to_value(&image).unwrap(),
            image.to_wire(),
        );
        assert_eq!(image.to_wire()["image_url"], "data:image/png;base64,Zm9v");
    }

    #[test]
    fn test_request_target_requires_both_names() {
        let req = InvocationRequest::new("weather", "forecast", Params::new());
        assert_eq!(req.target(), Some(("weather", "forecast")));

        let req = InvocationRequest {
            server_name: Some("weather".into()),
            tool_name: Some(String::new()),
            params: Params::new(),
        };
        assert!(req.target().is_none());
    }

    #[test]
    fn test_request_from_loose_value() {
        let value = serde_json::json!({
            "server_name": "github",
            "tool_name": 42,
            "params": {"q": "rust"}
        });
        let req = InvocationRequest::from_value(&value);
        assert_eq!(req.server_name.as_deref(), Some("github"));
        assert!(req.tool_name.is_none());
        assert_eq!(req.params_json(), r#"{"q":"rust"}"#);
    }
}
