use async_trait::async_trait;

use crate::capability::ToolCapabilities;
use crate::registry::Tool;

/// Takes no arguments and declares no capabilities — demonstrates the
/// plain case of the capability-bag pattern where a handler opts into
/// nothing.
pub struct CurrentTimeTool;

#[async_trait]
impl Tool for CurrentTimeTool {
    fn name(&self) -> &str {
        "current_time"
    }

    fn description(&self) -> &str {
        "Returns the current UTC time in RFC3339 format."
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _args: serde_json::Value, _capabilities: ToolCapabilities) -> Result<String, String> {
        Ok(chrono::Utc::now().to_rfc3339())
    }
}
