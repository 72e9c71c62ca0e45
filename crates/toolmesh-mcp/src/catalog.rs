use crate::protocol::ToolDescriptor;
use crate::registry::ConnectionRegistry;

/// Name of the host function the agent calls to run a batch.
pub const CALL_FUNCTION: &str = "mcp_call_tools";

/// Renders the tool catalog of every registered server for an agent prompt.
///
/// Returns an empty string when no server is registered.
pub async fn render_tool_catalog(registry: &ConnectionRegistry) -> String {
    let mut services = Vec::new();
    for (name, conn) in registry.snapshot().await {
        let tools = conn.lock().await.tools().to_vec();
        services.push((name, tools));
    }
    render_services(&services)
}

/// Renders `(service name, tools)` pairs, in order.
pub fn render_services(services: &[(String, Vec<ToolDescriptor>)]) -> String {
    if services.is_empty() {
        return String::new();
    }

    let mut lines = vec![
        format!("You can use the following tools to get information or perform actions by calling the {CALL_FUNCTION} function."),
        format!("The {CALL_FUNCTION} function accepts a list of tool calls, allowing for batch operations."),
        "Each tool call in the list should be a dictionary with 'server_name', 'tool_name', and 'params'.".to_string(),
    ];

    for (name, tools) in services {
        lines.push(format!("Service: {name}"));
        if tools.is_empty() {
            lines.push("  (No available tools)".to_string());
            continue;
        }
        for tool in tools {
            lines.push(format!(
                "  Tool: {} - {}",
                tool.name,
                tool.description.as_deref().unwrap_or_default()
            ));
            let params = tool.parameters();
            if params.is_empty() {
                lines.push("    No parameters".to_string());
                continue;
            }
            lines.push("    Parameters:".to_string());
            for param in params {
                let necessity = if param.required { "Required" } else { "Optional" };
                lines.push(format!(
                    "      - {} ({}, {necessity}) {}",
                    param.name, param.kind, param.description
                ));
            }
        }
    }

    lines.push(format!(
        "Example for a single call: {CALL_FUNCTION}(tool_calls=[{{'server_name': 'your_server', 'tool_name': 'your_tool', 'params': {{'param1': 'value1'}}}}])"
    ));
    lines.push(format!(
        "Example for multiple calls: {CALL_FUNCTION}(tool_calls=[{{'server_name': 'server1', 'tool_name': 'tool_a', 'params': {{}}}}, {{'server_name': 'server2', 'tool_name': 'tool_b', 'params': {{'key': 'val'}}}}])"
    ));
    lines.join("\n")
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn tool(value: serde_json::Value) -> ToolDescriptor {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_empty_registry_renders_nothing() {
        assert_eq!(render_services(&[]), "");
    }

    #[test]
    fn test_catalog_marks_required_and_optional() {
        let services = vec![
            (
                "weather".to_string(),
                vec![
                    tool(serde_json::json!({
                        "name": "forecast",
                        "description": "Daily forecast",
                        "inputSchema": {
                            "type": "object",
                            "properties": {
                                "city": {"type": "string", "description": "City name"},
                                "days": {"type": "integer", "description": "How many days"}
                            },
                            "required": ["city"]
                        }
                    })),
                    tool(serde_json::json!({"name": "now"})),
                ],
            ),
            ("empty".to_string(), Vec::new()),
        ];

        let text = render_services(&services);
        assert!(text.starts_with("You can use the following tools"));
        assert!(text.contains("Service: weather\n  Tool: forecast - Daily forecast\n    Parameters:"));
        assert!(text.contains("      - city (string, Required) City name"));
        assert!(text.contains("      - days (integer, Optional) How many days"));
        assert!(text.contains("  Tool: now - \n    No parameters"));
        assert!(text.contains("Service: empty\n  (No available tools)"));
        assert!(text.contains(
            "Example for a single call: mcp_call_tools(tool_calls=[{'server_name': 'your_server', 'tool_name': 'your_tool', 'params': {'param1': 'value1'}}])"
        ));
        assert!(text.ends_with("'params': {'key': 'val'}}])"));
    }

    #[tokio::test]
    async fn test_render_from_empty_registry() {
        let registry = ConnectionRegistry::new();
        assert!(render_tool_catalog(&registry).await.is_empty());
    }
}
