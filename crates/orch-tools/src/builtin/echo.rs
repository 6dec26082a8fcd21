use async_trait::async_trait;

use crate::capability::ToolCapabilities;
use crate::registry::Tool;

/// Round-trips its `s` argument. Exists purely to exercise the tool loop
/// end-to-end: a single tool round then a final reply.
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo_tool"
    }

    fn description(&self) -> &str {
        "Echoes back the given string."
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "s": { "type": "string", "description": "the string to echo back" },
            },
            "required": ["s"],
        })
    }

    async fn execute(&self, args: serde_json::Value, _capabilities: ToolCapabilities) -> Result<String, String> {
        args.get("s")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| "missing required argument 's'".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn echoes_its_input() {
        let tool = EchoTool;
        let result = tool
            .execute(serde_json::json!({"s": "ok"}), ToolCapabilities::default())
            .await
            .unwrap();
        assert_eq!(result, "ok");
    }

    #[tokio::test]
    async fn errors_without_s() {
        let tool = EchoTool;
        assert!(tool.execute(serde_json::json!({}), ToolCapabilities::default()).await.is_err());
    }
}
