use std::sync::Arc;

use async_trait::async_trait;
use orch_context::ContextFacade;

use crate::capability::ToolCapabilities;
use crate::registry::Tool;

/// Demonstrates the capability-bag pattern against a read-only facade into
/// the Context store rather than the whole component. Declares `chat_id`;
/// reports the active model and message count for the calling chat.
pub struct ContextLookupTool {
    context: Arc<dyn ContextFacade>,
}

impl ContextLookupTool {
    pub fn new(context: Arc<dyn ContextFacade>) -> Self {
        Self { context }
    }
}

#[async_trait]
impl Tool for ContextLookupTool {
    fn name(&self) -> &str {
        "context_lookup"
    }

    fn description(&self) -> &str {
        "Reports the active model and message count for the current chat."
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({ "type": "object", "properties": {} })
    }

    fn wants_chat_id(&self) -> bool {
        true
    }

    async fn execute(&self, _args: serde_json::Value, capabilities: ToolCapabilities) -> Result<String, String> {
        let chat_id = capabilities.chat_id.ok_or_else(|| "chat_id capability not supplied".to_string())?;
        let snapshot = self.context.snapshot(&chat_id).await;
        Ok(format!(
            "model={} messages={} tools_call={}",
            snapshot.data.model,
            snapshot.data.messages.len(),
            snapshot.tools_call
        ))
    }
}
