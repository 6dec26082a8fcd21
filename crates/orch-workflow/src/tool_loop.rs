use orch_ports::{build_chat_request, ChatResponse, PortManager};
use orch_sessions::{SessionEntry, SessionId, SessionStore};
use orch_tools::ToolRegistry;
use tracing::{debug, warn};

use crate::error::{Result, WorkflowError};
use crate::tracking::{ToolCallObserver, ToolCallStatus};

async fn call_model(entry: &SessionEntry, ports: &PortManager) -> Result<ChatResponse> {
    let data = &entry.data.data;
    let request = build_chat_request(
        data.model.clone(),
        data.messages.clone(),
        data.max_tokens,
        data.temperature,
        data.tools.clone(),
    );
    match ports.send_to_model_async(&request).await {
        None => Err(WorkflowError::ModelUnavailable),
        Some(Err(e)) => Err(WorkflowError::ModelFailed(e.to_string())),
        Some(Ok(response)) => Ok(response),
    }
}

/// Runs one session's model turn, including the tool loop: an assistant
/// message requesting tools is executed serially and its results fed back
/// to the model, bounded by `max_tool_calls` rounds. Grounded on
/// `task_manager.py::_workflow_c`/`_handle_tool_calls`, generalized from a
/// single tool round into an iterative loop.
pub async fn run_session_turn(
    session_store: &SessionStore,
    session_id: &SessionId,
    ports: &PortManager,
    tools: &ToolRegistry,
    max_tool_calls: u32,
    observer: &dyn ToolCallObserver,
) -> Result<ChatResponse> {
    let entry_arc = session_store
        .acquire(session_id)
        .ok_or_else(|| WorkflowError::SessionMissing(session_id.to_string()))?;
    let mut guard = entry_arc.lock().await;
    let chat_id = guard.data.chat_id.clone();

    let mut response = call_model(&guard, ports).await?;
    let mut rounds = 0u32;

    while let Some(calls) = response.tool_calls.clone().filter(|c| !c.is_empty()) {
        if rounds >= max_tool_calls {
            warn!(session_id = %session_id, max_tool_calls, "tool loop exceeded round bound, using last response");
            break;
        }
        rounds += 1;

        session_store.add_tool_call_message(&mut guard, calls.clone());

        let mut results = Vec::with_capacity(calls.len());
        for call in &calls {
            observer.on_start(session_id, &call.id, &call.function.name).await;
            let args: serde_json::Value = serde_json::from_str(&call.function.arguments).unwrap_or(serde_json::json!({}));
            let content = tools
                .execute_with_timeout(&call.function.name, args, Some(chat_id.clone()), Some(session_id.to_string()))
                .await;
            debug!(session_id = %session_id, tool = %call.function.name, "tool call executed");
            let status = if content.starts_with("工具执行超时") {
                ToolCallStatus::Timeout
            } else if content.starts_with("工具执行失败") {
                ToolCallStatus::Failed
            } else {
                ToolCallStatus::Completed
            };
            observer.on_finish(session_id, &call.id, status, &content).await;
            results.push((call.id.clone(), call.function.name.clone(), content));
        }
        session_store.add_tool_results(&mut guard, results);

        response = call_model(&guard, ports).await?;
    }

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use orch_context::{ChatContext, ChatData};
    use orch_core::config::ToolRegistryConfig;
    use orch_core::{ChatId, ChatMode, Content, Message, ToolCallFunction, ToolCallRequest, ToolDefinition};
    use orch_ports::{ChatRequest, PortError, PortManagerConfig, PortStatus};
    use crate::tracking::NoopObserver;
    use orch_sessions::SessionStoreConfig;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

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
        async fn send_request(&self, _request: &ChatRequest) -> std::result::Result<ChatResponse, PortError> {
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

    fn sample_context() -> ChatContext {
        ChatContext {
            chat_id: ChatId::from("c1"),
            chat_mode: ChatMode::Llm,
            tools_call: true,
            data: ChatData {
                model: "m".to_string(),
                messages: vec![Message::system("core"), Message::user(Content::text("hi"))],
                max_tokens: 10,
                temperature: 0.5,
                stream: false,
                tools: Some(vec![ToolDefinition {
                    name: "echo_tool".to_string(),
                    description: "echoes".to_string(),
                    parameters: serde_json::json!({"type": "object"}),
                }]),
            },
        }
    }

    struct NullContext;
    #[async_trait]
    impl orch_context::ContextFacade for NullContext {
        async fn snapshot(&self, chat_id: &ChatId) -> ChatContext {
            ChatContext { chat_id: chat_id.clone(), ..sample_context() }
        }
    }

    fn make_ports(responses: Vec<ChatResponse>) -> PortManager {
        let mut manager = PortManager::new(PortManagerConfig { health_check_interval_secs: 30, max_reconnect_attempts: 1 });
        manager.register_model(Arc::new(ScriptedModel { calls: AtomicU32::new(0), responses }));
        manager
    }

    #[tokio::test]
    async fn no_tool_calls_returns_first_response() {
        let store = SessionStore::new(SessionStoreConfig { session_timeout_minutes: 5, max_sessions: 10 });
        let session_id = store.create(&sample_context()).await;
        let registry = ToolRegistry::new(ToolRegistryConfig::default(), Arc::new(NullContext));
        let ports = make_ports(vec![ChatResponse { content: Some("hello".to_string()), tool_calls: None }]);

        let response = run_session_turn(&store, &session_id, &ports, &registry, 10, &NoopObserver).await.unwrap();
        assert_eq!(response.content.as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn executes_one_tool_round_then_returns_final_text() {
        let store = SessionStore::new(SessionStoreConfig { session_timeout_minutes: 5, max_sessions: 10 });
        let session_id = store.create(&sample_context()).await;
        let registry = ToolRegistry::new(ToolRegistryConfig::default(), Arc::new(NullContext));

        let tool_call = ToolCallRequest {
            id: "call_1".to_string(),
            call_type: "function".to_string(),
            function: ToolCallFunction { name: "echo_tool".to_string(), arguments: r#"{"s": "ok"}"#.to_string() },
        };
        let ports = make_ports(vec![
            ChatResponse { content: None, tool_calls: Some(vec![tool_call]) },
            ChatResponse { content: Some("done".to_string()), tool_calls: None },
        ]);

        let response = run_session_turn(&store, &session_id, &ports, &registry, 10, &NoopObserver).await.unwrap();
        assert_eq!(response.content.as_deref(), Some("done"));

        let data = store.get(&session_id).await.unwrap();
        assert_eq!(data.tool_call_count, 1);
    }

    #[tokio::test]
    async fn exceeding_round_bound_returns_last_response() {
        let store = SessionStore::new(SessionStoreConfig { session_timeout_minutes: 5, max_sessions: 10 });
        let session_id = store.create(&sample_context()).await;
        let registry = ToolRegistry::new(ToolRegistryConfig::default(), Arc::new(NullContext));

        let tool_call = ToolCallRequest {
            id: "call_1".to_string(),
            call_type: "function".to_string(),
            function: ToolCallFunction { name: "echo_tool".to_string(), arguments: r#"{"s": "ok"}"#.to_string() },
        };
        let always_wants_tools = ChatResponse { content: None, tool_calls: Some(vec![tool_call]) };
        let ports = make_ports(vec![always_wants_tools.clone(), always_wants_tools.clone(), always_wants_tools]);

        let response = run_session_turn(&store, &session_id, &ports, &registry, 1, &NoopObserver).await.unwrap();
        assert!(response.tool_calls.is_some());
    }

    #[tokio::test]
    async fn missing_session_errors() {
        let store = SessionStore::new(SessionStoreConfig { session_timeout_minutes: 5, max_sessions: 10 });
        let registry = ToolRegistry::new(ToolRegistryConfig::default(), Arc::new(NullContext));
        let ports = make_ports(vec![]);
        let err = run_session_turn(&store, &SessionId("sess_missing".to_string()), &ports, &registry, 10, &NoopObserver)
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::SessionMissing(_)));
    }
}
