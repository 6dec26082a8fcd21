use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use axum::{routing::get, Router};
use orch_context::ContextStore;
use orch_core::{ChatId, OrchConfig, Shutdown, ToolSchemaHandle};
use orch_ports::{InboundFrame, InboundSink, OpenAiCompatModel, OutboundFrame, PortManager, WsFrontend};
use orch_queue::{QueueManager, ResultSink};
use orch_sessions::SessionStore;
use orch_tools::ToolRegistry;
use orch_workflow::{CommandHandler, RulesManager, ToolCallTracker, WorkflowEngine};
use serde_json::Value;
use tracing::{error, warn};

/// Shared handles every Axum route and background daemon reaches through.
///
/// Construction order follows the cycle-breaking design recorded on
/// `ToolSchemaHandle`: the handle is built first, the Context store is
/// built against it, the Tool registry is built against the Context
/// store, and only then is the handle filled in with the registry's live
/// schema.
pub struct AppState {
    pub context: Arc<ContextStore>,
    pub sessions: Arc<SessionStore>,
    pub tools: Arc<ToolRegistry>,
    pub queue: Arc<QueueManager>,
    pub ports: Arc<PortManager>,
    pub ws_frontend: Arc<WsFrontend>,
    pub rules: Arc<RulesManager>,
}

impl AppState {
    pub async fn build(config: &OrchConfig, shutdown: Shutdown) -> Arc<Self> {
        let schema_handle = Arc::new(ToolSchemaHandle::new());
        let context = Arc::new(ContextStore::new(config.context_store.clone(), schema_handle.clone()));
        let tools = Arc::new(ToolRegistry::new(config.tool_registry.clone(), context.clone()));
        schema_handle.set(tools.definitions().await);

        let sessions = Arc::new(SessionStore::new(orch_sessions::SessionStoreConfig {
            session_timeout_minutes: config.session_store.session_timeout_minutes,
            max_sessions: config.session_store.max_sessions,
        }));
        let tracker = Arc::new(ToolCallTracker::new());
        let commands = Arc::new(CommandHandler::new(
            context.clone(),
            tools.clone(),
            config.context_store.chat_mode.clone(),
            config.command_handler.admins.clone(),
        ));

        let mut port_manager = PortManager::new(orch_ports::PortManagerConfig {
            health_check_interval_secs: config.port_manager.health_check_interval_secs,
            max_reconnect_attempts: config.port_manager.max_reconnect_attempts,
        });
        let ws_frontend = WsFrontend::new();
        port_manager.register_frontend(ws_frontend.clone());

        if let Ok(base_url) = std::env::var("ORCH_MODEL_BASE_URL") {
            let api_key = std::env::var("ORCH_MODEL_API_KEY").unwrap_or_default();
            let model_name = std::env::var("ORCH_MODEL_NAME").unwrap_or_else(|_| config.context_store.default_model.clone());
            let model = OpenAiCompatModel::new(model_name, api_key, base_url, config.port_manager.max_concurrent_requests_per_model);
            port_manager.register_model(model);
        } else {
            warn!("ORCH_MODEL_BASE_URL not set, no model backend registered");
        }

        let ports = Arc::new(port_manager);

        let engine = Arc::new(WorkflowEngine::new(
            context.clone(),
            sessions.clone(),
            commands,
            ports.clone(),
            tools.clone(),
            tracker,
            config.workflow.clone(),
        ));

        let sink = Arc::new(DispatchSink { ports: ports.clone(), rules: OnceLock::new() });
        let queue = QueueManager::new(engine.clone(), sink.clone(), shutdown.clone());

        let rules = Arc::new(RulesManager::new(config.rules_manager.clone(), queue.clone(), engine, sink.clone()));
        let _ = sink.rules.set(rules.clone());

        Arc::new(Self {
            context,
            sessions,
            tools,
            queue,
            ports,
            ws_frontend,
            rules,
        })
    }

    /// Wires the websocket frontend's inbound frames into the message
    /// queue and brings every registered port up.
    pub async fn start_ports(&self) {
        self.ports.start_all(inbound_sink(self.queue.clone())).await;
    }

    /// Runs once the shutdown signal has already been raised: stops every
    /// port, drains in-flight detached workflow-C tasks, drains the
    /// queues, and flushes dirty contexts to disk.
    pub async fn drain(&self) {
        self.ports.stop_all().await;
        self.rules.shutdown().await;
        self.queue.shutdown().await;
        self.context.flush_all().await;
    }
}

/// Routes a dequeued task's result to wherever it needs to go next: a
/// successful workflow-B result hands off to the Rules manager;
/// everything else carrying a chat-visible reply (a workflow-C response,
/// or a command's immediate reply regardless of which workflow produced
/// it) is fanned out to the frontends.
struct DispatchSink {
    ports: Arc<PortManager>,
    rules: OnceLock<Arc<RulesManager>>,
}

#[async_trait]
impl ResultSink for DispatchSink {
    async fn deliver(&self, result: Value) {
        if result.get("command").is_some() {
            self.reply(&result).await;
            return;
        }

        match result.get("workflow_type").and_then(Value::as_str) {
            Some("B") if result.get("success").and_then(Value::as_bool) == Some(true) => {
                let (Some(chat_id), Some(session_id)) =
                    (result.get("chat_id").and_then(Value::as_str), result.get("session_id").and_then(Value::as_str))
                else {
                    return;
                };
                let context_data = result.get("context_data").cloned().unwrap_or(Value::Null);
                match self.rules.get() {
                    Some(rules) => rules.handle_workflow_b_result(ChatId::from(chat_id), session_id.to_string(), context_data).await,
                    None => warn!("workflow B result delivered before rules manager was wired"),
                }
            }
            Some("C") => self.reply(&result).await,
            _ => {}
        }
    }
}

impl DispatchSink {
    async fn reply(&self, result: &Value) {
        let Some(chat_id) = result.get("chat_id").and_then(Value::as_str) else {
            return;
        };
        let content = result.get("content").and_then(Value::as_str).unwrap_or_default().to_string();
        let timestamp = result
            .get("timestamp")
            .and_then(Value::as_f64)
            .unwrap_or_else(|| chrono::Utc::now().timestamp_millis() as f64 / 1000.0);
        self.ports
            .send_response_async(&OutboundFrame { chat_id: ChatId::from(chat_id), content, timestamp })
            .await;
    }
}

/// Forwards every inbound frame from a registered frontend into the
/// message queue — the agent core's `message_callback` wiring.
struct QueueSink {
    queue: Arc<QueueManager>,
}

#[async_trait]
impl InboundSink for QueueSink {
    async fn on_message(&self, frame: InboundFrame) {
        let chat_id = frame.chat_id.clone();
        let task_data = serde_json::json!({
            "chat_id": chat_id.as_str(),
            "content": frame.content,
            "is_respond": frame.is_respond,
            "timestamp": frame.timestamp,
        });
        if let Err(e) = self.queue.enqueue_message(chat_id, task_data).await {
            error!(error = %e, "failed to enqueue inbound frame");
        }
    }
}

pub(crate) fn inbound_sink(queue: Arc<QueueManager>) -> Arc<dyn InboundSink> {
    Arc::new(QueueSink { queue })
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(crate::http::health::health_handler))
        .route("/ws", get(crate::ws::connection::ws_handler))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use orch_core::config::{ChatModeModels, ContextStoreConfig};
    use std::time::Duration;

    fn test_config(dir: &std::path::Path) -> OrchConfig {
        let mut config = OrchConfig::default();
        config.context_store = ContextStoreConfig {
            history_dir: dir.to_string_lossy().to_string(),
            chat_mode: ChatModeModels { llm_models: vec!["m".to_string()], mllm_models: vec![] },
            ..ContextStoreConfig::default()
        };
        config
    }

    async fn recv_within(rx: &mut tokio::sync::mpsc::UnboundedReceiver<String>) -> String {
        tokio::time::timeout(Duration::from_secs(2), rx.recv()).await.expect("timed out waiting for outbound frame").expect("channel closed")
    }

    #[tokio::test]
    async fn build_wires_every_component_without_a_registered_model() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let shutdown = Shutdown::new();

        let state = AppState::build(&config, shutdown.clone()).await;

        assert!(state.ports.model_statuses().await.is_empty());
        assert!(state.ports.frontend_statuses().await.is_empty());
        state.drain().await;
    }

    #[tokio::test]
    async fn command_message_round_trips_through_the_websocket_frontend() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let shutdown = Shutdown::new();

        let state = AppState::build(&config, shutdown.clone()).await;
        state.start_ports().await;
        let (_conn_id, mut outbound) = state.ws_frontend.register_connection();

        let frame = serde_json::json!({
            "chat_id": "c1",
            "content": "#模型查询",
            "is_respond": false,
            "timestamp": 0.0,
        });
        state.ws_frontend.handle_inbound_text(&frame.to_string()).await;

        let payload = recv_within(&mut outbound).await;
        let reply: Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(reply["chat_id"], "c1");
        assert!(reply["content"].as_str().unwrap().contains("模型"));

        state.drain().await;
    }

    #[tokio::test]
    async fn plain_message_updates_context_with_no_outbound_reply() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let shutdown = Shutdown::new();

        let state = AppState::build(&config, shutdown.clone()).await;
        state.start_ports().await;
        let (_conn_id, mut outbound) = state.ws_frontend.register_connection();

        let frame = serde_json::json!({
            "chat_id": "c2",
            "content": "hello there",
            "is_respond": false,
            "timestamp": 0.0,
        });
        state.ws_frontend.handle_inbound_text(&frame.to_string()).await;

        assert!(
            tokio::time::timeout(Duration::from_millis(300), outbound.recv()).await.is_err(),
            "workflow A ambient updates must not produce an outbound frame"
        );

        let ctx = state.context.get(&ChatId::from("c2")).await;
        assert_eq!(ctx.data.messages.last().unwrap().text().as_deref(), Some("hello there"));

        state.drain().await;
    }

    #[tokio::test]
    async fn dispatch_sink_warns_instead_of_panicking_before_rules_manager_is_wired() {
        let ports = Arc::new(PortManager::new(orch_ports::PortManagerConfig { health_check_interval_secs: 30, max_reconnect_attempts: 1 }));
        let sink = DispatchSink { ports, rules: OnceLock::new() };

        sink.deliver(serde_json::json!({
            "success": true,
            "workflow_type": "B",
            "chat_id": "c1",
            "session_id": "s1",
            "context_data": {},
        }))
        .await;
    }
}
