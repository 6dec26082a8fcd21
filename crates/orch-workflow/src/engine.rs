use std::sync::Arc;

use async_trait::async_trait;
use orch_context::ContextStore;
use orch_core::config::WorkflowConfig;
use orch_core::{ChatId, Content, Message, Role, WorkflowType};
use orch_ports::PortManager;
use orch_queue::{QueueTask, TaskHandler};
use orch_sessions::{SessionId, SessionStore};
use orch_tools::ToolRegistry;
use serde_json::Value;
use tracing::error;

use crate::command::{is_command, CommandHandler};
use crate::response::extract_response_content;
use crate::rules::WorkflowCExecutor;
use crate::tool_loop::run_session_turn;
use crate::tracking::ToolCallTracker;

fn inbound_content(task_data: &Value) -> Option<Content> {
    serde_json::from_value(task_data.get("content")?.clone()).ok()
}

/// Runs the three workflows a dequeued task is routed to. Implements
/// [`TaskHandler`] so the queue manager can dispatch into it directly, and
/// [`WorkflowCExecutor`] so the Rules manager's `all` mode can run workflow C
/// without going through the model queue at all. Grounded on
/// `task_manager.py::TaskManager`.
pub struct WorkflowEngine {
    context: Arc<ContextStore>,
    sessions: Arc<SessionStore>,
    commands: Arc<CommandHandler>,
    ports: Arc<PortManager>,
    tools: Arc<ToolRegistry>,
    tracker: Arc<ToolCallTracker>,
    max_tool_calls: u32,
}

impl WorkflowEngine {
    pub fn new(
        context: Arc<ContextStore>,
        sessions: Arc<SessionStore>,
        commands: Arc<CommandHandler>,
        ports: Arc<PortManager>,
        tools: Arc<ToolRegistry>,
        tracker: Arc<ToolCallTracker>,
        workflow_config: WorkflowConfig,
    ) -> Self {
        Self {
            context,
            sessions,
            commands,
            ports,
            tools,
            tracker,
            max_tool_calls: workflow_config.max_tool_calls,
        }
    }

    pub fn tracker(&self) -> &Arc<ToolCallTracker> {
        &self.tracker
    }

    /// Ambient update with no response: the user message is folded into
    /// context unconditionally, then, if it's a `#`-prefixed command, the
    /// command runs and its result is returned in place of the plain A ack.
    async fn run_workflow_a(&self, chat_id: &ChatId, content: Content) -> Value {
        let command_text = is_command(Role::User, &content).then(|| content.joined_text());

        if let Err(e) = self.context.update(chat_id, Message::user(content)).await {
            error!(chat_id = %chat_id, error = %e, "workflow A context update failed");
        }

        if let Some(text) = command_text {
            let result = self.commands.execute(&text, chat_id).await;
            return result.into_value();
        }

        serde_json::json!({"success": true, "workflow_type": "A", "chat_id": chat_id.as_str()})
    }

    /// Prepares a model turn: same command short-circuit as workflow A
    /// (labeled `A` on output, per the B-dispatch command shortcut), else
    /// folds the message into context and spins up a session from the
    /// resulting snapshot.
    async fn run_workflow_b(&self, chat_id: &ChatId, content: Content) -> Value {
        if is_command(Role::User, &content) {
            let result = self.commands.execute(&content.joined_text(), chat_id).await;
            let mut value = result.into_value();
            if let Some(obj) = value.as_object_mut() {
                obj.insert("workflow_type".to_string(), Value::String("A".to_string()));
                obj.insert("is_command".to_string(), Value::Bool(true));
            }
            return value;
        }

        if let Err(e) = self.context.update(chat_id, Message::user(content)).await {
            error!(chat_id = %chat_id, error = %e, "workflow B context update failed");
            return serde_json::json!({
                "success": false,
                "workflow_type": "B",
                "chat_id": chat_id.as_str(),
                "error": e.to_string(),
            });
        }

        let snapshot = self.context.get(chat_id).await;
        let context_data = serde_json::to_value(&snapshot.data).unwrap_or(Value::Null);
        let session_id = self.sessions.create(&snapshot).await;
        serde_json::json!({
            "success": true,
            "workflow_type": "B",
            "chat_id": chat_id.as_str(),
            "session_id": session_id.to_string(),
            "context_data": context_data,
        })
    }

    /// Runs the model turn for a prepared session, including the tool loop,
    /// then cleans the session up and appends the assistant reply back to
    /// context.
    async fn run_workflow_c(&self, chat_id: &ChatId, session_id: &SessionId) -> Value {
        let response =
            match run_session_turn(&self.sessions, session_id, &self.ports, &self.tools, self.max_tool_calls, self.tracker.as_ref()).await {
                Ok(r) => Some(r),
                Err(e) => {
                    error!(chat_id = %chat_id, session_id = %session_id, error = %e, "workflow C model turn failed");
                    None
                }
            };

        self.sessions.cleanup(session_id);
        self.tracker.clear_session(session_id);

        let content = extract_response_content(response.as_ref());

        if let Err(e) = self.context.update(chat_id, Message::assistant_text(content.clone())).await {
            error!(chat_id = %chat_id, error = %e, "workflow C failed to append assistant reply");
        }

        let timestamp = chrono::Utc::now().timestamp_millis() as f64 / 1000.0;
        serde_json::json!({
            "success": true,
            "workflow_type": "C",
            "chat_id": chat_id.as_str(),
            "content": content,
            "timestamp": timestamp,
            "append_to_context": true,
        })
    }
}

#[async_trait]
impl TaskHandler for WorkflowEngine {
    async fn handle_task(&self, task: QueueTask) -> Option<Value> {
        match task.workflow_type {
            WorkflowType::A => {
                let content = inbound_content(&task.task_data)?;
                Some(self.run_workflow_a(&task.chat_id, content).await)
            }
            WorkflowType::B => {
                let content = inbound_content(&task.task_data)?;
                Some(self.run_workflow_b(&task.chat_id, content).await)
            }
            WorkflowType::C => {
                let session_id = task.task_data.get("session_id")?.as_str().map(|s| SessionId(s.to_string()))?;
                Some(self.run_workflow_c(&task.chat_id, &session_id).await)
            }
        }
    }
}

#[async_trait]
impl WorkflowCExecutor for WorkflowEngine {
    async fn execute_workflow_c(&self, chat_id: ChatId, session_id: String, _context_data: Value) -> Value {
        self.run_workflow_c(&chat_id, &SessionId(session_id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use orch_core::config::{ChatModeModels, ContextStoreConfig, ToolRegistryConfig};
    use orch_core::NoTools;
    use orch_sessions::SessionStoreConfig;
    use orch_ports::{ChatResponse, PortError, PortManagerConfig, PortStatus};
    use std::sync::atomic::{AtomicU32, Ordering};

    struct ScriptedModel {
        calls: AtomicU32,
        responses: Vec<ChatResponse>,
    }

    #[async_trait]
    impl orch_ports::ModelAdapter for ScriptedModel {
        fn name(&self) -> &str {
            "scripted"
        }
        async fn start(&self) -> std::result::Result<(), PortError> {
            Ok(())
        }
        async fn stop(&self) -> std::result::Result<(), PortError> {
            Ok(())
        }
        async fn send_request(&self, _request: &orch_ports::ChatRequest) -> std::result::Result<ChatResponse, PortError> {
            let i = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
            Ok(self.responses[i.min(self.responses.len() - 1)].clone())
        }
        async fn is_connected(&self) -> bool {
            true
        }
        async fn status(&self) -> PortStatus {
            PortStatus::Connected
        }
    }

    fn make_engine(dir: &std::path::Path, responses: Vec<ChatResponse>) -> WorkflowEngine {
        let context_config = ContextStoreConfig {
            history_dir: dir.to_string_lossy().to_string(),
            chat_mode: ChatModeModels {
                llm_models: vec!["m".to_string()],
                mllm_models: vec![],
            },
            ..ContextStoreConfig::default()
        };
        let context = Arc::new(ContextStore::new(context_config, Arc::new(NoTools)));
        let sessions = Arc::new(SessionStore::new(SessionStoreConfig { session_timeout_minutes: 5, max_sessions: 10 }));
        let facade: Arc<dyn orch_context::ContextFacade> = context.clone();
        let tools = Arc::new(ToolRegistry::new(ToolRegistryConfig::default(), facade));
        let commands = Arc::new(CommandHandler::new(
            context.clone(),
            tools.clone(),
            ChatModeModels { llm_models: vec!["m".to_string()], mllm_models: vec![] },
            vec![],
        ));
        let mut manager = PortManager::new(PortManagerConfig { health_check_interval_secs: 30, max_reconnect_attempts: 1 });
        manager.register_model(Arc::new(ScriptedModel { calls: AtomicU32::new(0), responses }));
        let tracker = Arc::new(ToolCallTracker::new());

        WorkflowEngine::new(context, sessions, commands, Arc::new(manager), tools, tracker, WorkflowConfig { max_tool_calls: 10 })
    }

    #[tokio::test]
    async fn workflow_a_plain_message_updates_context_with_no_response() {
        let dir = tempfile::tempdir().unwrap();
        let engine = make_engine(dir.path(), vec![]);
        let chat_id = ChatId::from("c1");

        let result = engine.run_workflow_a(&chat_id, Content::text("hello")).await;
        assert_eq!(result["success"], true);
        assert_eq!(result["workflow_type"], "A");

        let ctx = engine.context.get(&chat_id).await;
        assert_eq!(ctx.data.messages.last().unwrap().text().as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn workflow_a_command_still_joins_the_transcript_before_executing() {
        let dir = tempfile::tempdir().unwrap();
        let engine = make_engine(dir.path(), vec![]);
        let chat_id = ChatId::from("c1");

        let before = engine.context.get(&chat_id).await.data.messages.len();
        let result = engine.run_workflow_a(&chat_id, Content::text("#模型查询")).await;
        assert_eq!(result["success"], true);
        assert_eq!(result["command"], "模型查询");

        let ctx = engine.context.get(&chat_id).await;
        assert_eq!(ctx.data.messages.len(), before + 1, "the command text is recorded before the command runs");
        assert_eq!(ctx.data.messages.last().unwrap().text().as_deref(), Some("#模型查询"));
    }

    #[tokio::test]
    async fn workflow_b_creates_session_and_returns_its_data() {
        let dir = tempfile::tempdir().unwrap();
        let engine = make_engine(dir.path(), vec![]);
        let chat_id = ChatId::from("c1");

        let result = engine.run_workflow_b(&chat_id, Content::text("hi")).await;
        assert_eq!(result["success"], true);
        assert_eq!(result["workflow_type"], "B");
        assert!(result["session_id"].as_str().unwrap().starts_with("sess_"));
        assert!(result["context_data"]["messages"].is_array());
    }

    #[tokio::test]
    async fn workflow_b_command_returns_a_shaped_result() {
        let dir = tempfile::tempdir().unwrap();
        let engine = make_engine(dir.path(), vec![]);
        let chat_id = ChatId::from("c1");

        let result = engine.run_workflow_b(&chat_id, Content::text("#帮助")).await;
        assert_eq!(result["workflow_type"], "A");
        assert_eq!(result["is_command"], true);
    }

    #[tokio::test]
    async fn workflow_c_runs_model_turn_cleans_up_and_appends_reply() {
        let dir = tempfile::tempdir().unwrap();
        let engine = make_engine(dir.path(), vec![ChatResponse { content: Some("hi there".to_string()), tool_calls: None }]);
        let chat_id = ChatId::from("c1");

        let b_result = engine.run_workflow_b(&chat_id, Content::text("hello")).await;
        let session_id = SessionId(b_result["session_id"].as_str().unwrap().to_string());

        let c_result = engine.run_workflow_c(&chat_id, &session_id).await;
        assert_eq!(c_result["content"], "hi there");
        assert_eq!(c_result["workflow_type"], "C");

        assert!(engine.sessions.get(&session_id).await.is_err(), "session must be cleaned up after workflow C");

        let ctx = engine.context.get(&chat_id).await;
        assert_eq!(ctx.data.messages.last().unwrap().text().as_deref(), Some("hi there"));
    }

    #[tokio::test]
    async fn handle_task_routes_by_workflow_type() {
        let dir = tempfile::tempdir().unwrap();
        let engine = make_engine(dir.path(), vec![]);
        let task = QueueTask {
            task_id: "t1".to_string(),
            chat_id: ChatId::from("c1"),
            task_data: serde_json::json!({"chat_id": "c1", "content": "hello", "is_respond": false, "timestamp": 0.0}),
            workflow_type: WorkflowType::A,
            created_at: chrono::Utc::now(),
        };
        let result = engine.handle_task(task).await.unwrap();
        assert_eq!(result["workflow_type"], "A");
    }

    #[tokio::test]
    async fn execute_workflow_c_matches_direct_call() {
        let dir = tempfile::tempdir().unwrap();
        let engine = make_engine(dir.path(), vec![ChatResponse { content: Some("done".to_string()), tool_calls: None }]);
        let chat_id = ChatId::from("c1");
        let b_result = engine.run_workflow_b(&chat_id, Content::text("hello")).await;
        let session_id = b_result["session_id"].as_str().unwrap().to_string();

        let result = engine.execute_workflow_c(chat_id, session_id, Value::Null).await;
        assert_eq!(result["content"], "done");
    }
}
