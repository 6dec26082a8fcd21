use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use orch_context::ContextFacade;
use orch_core::config::ToolRegistryConfig;
use orch_core::{ChatId, ToolDefinition, ToolSchemaProvider};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::builtin::{context_lookup::ContextLookupTool, current_time::CurrentTimeTool, echo::EchoTool};
use crate::capability::ToolCapabilities;

/// A single compiled-in tool plug-in. Grounded on
/// `skynet-agent/src/tools/mod.rs::Tool`, extended with explicit
/// capability-declaration methods in place of Python's
/// `inspect.signature` introspection.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn parameters(&self) -> serde_json::Value;

    fn wants_chat_id(&self) -> bool {
        false
    }
    fn wants_session_id(&self) -> bool {
        false
    }

    /// Per-tool timeout override; `None` falls back to the registry's
    /// `default_tool_timeout_seconds`.
    fn timeout_seconds(&self) -> Option<f64> {
        None
    }

    /// `Ok(content)` becomes the `tool` message's content verbatim; `Err(msg)`
    /// is wrapped into "工具执行失败: <msg>" by the registry.
    async fn execute(&self, args: serde_json::Value, capabilities: ToolCapabilities) -> Result<String, String>;
}

/// Discovers tool plug-ins, exposes their schemas, and executes a named
/// tool with a timeout. Tools are a compiled-in `Vec`
/// assembled by [`build_registry`] rather than a directory scan; `reload()`
/// rebuilds that vec so the Command handler's `重载`/`热重载` has something
/// real to call.
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, Arc<dyn Tool>>>,
    default_timeout_seconds: f64,
    context: Arc<dyn ContextFacade>,
}

impl ToolRegistry {
    pub fn new(config: ToolRegistryConfig, context: Arc<dyn ContextFacade>) -> Self {
        let tools = build_registry(context.clone());
        Self {
            tools: RwLock::new(index_by_name(tools)),
            default_timeout_seconds: config.default_tool_timeout_seconds,
            context,
        }
    }

    /// Rebuilds the registry atomically. There is no filesystem to rescan —
    /// this exists so the `重载`/`热重载` commands have a real effect if the
    /// compiled-in tool set ever changes between calls (e.g. feature-flagged
    /// tools).
    pub async fn reload(&self) {
        let tools = build_registry(self.context.clone());
        let mut guard = self.tools.write().await;
        *guard = index_by_name(tools);
        debug!(count = guard.len(), "tool registry reloaded");
    }

    pub async fn definitions(&self) -> Vec<ToolDefinition> {
        let tools = self.tools.read().await;
        tools
            .values()
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters(),
            })
            .collect()
    }

    /// Injects capabilities only if declared, awaits under a per-tool
    /// deadline, and never propagates a panic or error to the caller — both
    /// become a fixed-format string that is itself the `tool` message
    /// content.
    pub async fn execute_with_timeout(
        &self,
        name: &str,
        args: serde_json::Value,
        chat_id: Option<ChatId>,
        session_id: Option<String>,
    ) -> String {
        let tool = {
            let tools = self.tools.read().await;
            tools.get(name).cloned()
        };

        let Some(tool) = tool else {
            warn!(tool = name, "execution requested for unknown tool");
            return format!("工具执行失败: 未知工具 {}", name);
        };

        let timeout_secs = tool.timeout_seconds().unwrap_or(self.default_timeout_seconds);
        let capabilities = ToolCapabilities {
            chat_id: if tool.wants_chat_id() { chat_id } else { None },
            session_id: if tool.wants_session_id() { session_id } else { None },
        };

        match tokio::time::timeout(Duration::from_secs_f64(timeout_secs), tool.execute(args, capabilities)).await {
            Ok(Ok(result)) => result,
            Ok(Err(msg)) => {
                warn!(tool = name, error = %msg, "tool execution failed");
                format!("工具执行失败: {}", msg)
            }
            Err(_) => {
                warn!(tool = name, timeout_secs, "tool execution timed out");
                format!("工具执行超时 (超时时间: {}s)", format_seconds(timeout_secs))
            }
        }
    }
}

fn index_by_name(tools: Vec<Arc<dyn Tool>>) -> HashMap<String, Arc<dyn Tool>> {
    tools.into_iter().map(|t| (t.name().to_string(), t)).collect()
}

fn format_seconds(seconds: f64) -> String {
    if seconds.fract() == 0.0 {
        format!("{}", seconds as i64)
    } else {
        format!("{:.1}", seconds)
    }
}

/// The compiled-in tool set. Two illustrative tools exercise the loop
/// end-to-end (`echo_tool`, `current_time`); `context_lookup` demonstrates
/// the capability-bag pattern against a read-only Context store facade.
pub fn build_registry(context: Arc<dyn ContextFacade>) -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(EchoTool),
        Arc::new(CurrentTimeTool),
        Arc::new(ContextLookupTool::new(context)),
    ]
}
