use std::sync::Arc;

use async_trait::async_trait;
use orch_core::config::{RulesManagerConfig, RulesMode};
use orch_core::ChatId;
use orch_queue::{QueueManager, ResultSink};
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, error};

/// Runs workflow C directly, bypassing the model queue. Implemented by the
/// workflow engine; kept as a trait here so `all` mode doesn't need to know
/// about the engine's other responsibilities.
#[async_trait]
pub trait WorkflowCExecutor: Send + Sync {
    async fn execute_workflow_c(&self, chat_id: ChatId, session_id: String, context_data: Value) -> Value;
}

/// Decides whether a completed workflow-B result runs through the chat's
/// model queue (`wait`, strict per-chat ordering) or as an immediately
/// spawned detached task (`all`, higher throughput, no ordering guarantee).
/// Grounded on `rules_manager.py::RulesManager`.
pub struct RulesManager {
    queue_manager: Arc<QueueManager>,
    executor: Arc<dyn WorkflowCExecutor>,
    result_sink: Arc<dyn ResultSink>,
    mode: RulesMode,
    active_tasks: Mutex<JoinSet<()>>,
}

impl RulesManager {
    pub fn new(
        config: RulesManagerConfig,
        queue_manager: Arc<QueueManager>,
        executor: Arc<dyn WorkflowCExecutor>,
        result_sink: Arc<dyn ResultSink>,
    ) -> Self {
        Self {
            queue_manager,
            executor,
            result_sink,
            mode: config.mode,
            active_tasks: Mutex::new(JoinSet::new()),
        }
    }

    pub fn mode(&self) -> RulesMode {
        self.mode
    }

    /// Dispatches a successful workflow-B result per the configured mode.
    pub async fn handle_workflow_b_result(&self, chat_id: ChatId, session_id: String, context_data: Value) {
        match self.mode {
            RulesMode::Wait => self.dispatch_wait(chat_id, session_id, context_data).await,
            RulesMode::All => self.dispatch_all(chat_id, session_id, context_data).await,
        }
    }

    async fn dispatch_wait(&self, chat_id: ChatId, session_id: String, context_data: Value) {
        let task_data = serde_json::json!({
            "chat_id": chat_id.as_str(),
            "session_id": session_id,
            "context_data": context_data,
        });
        match self.queue_manager.enqueue_llm(chat_id.clone(), task_data).await {
            Ok(task_id) => debug!(task_id = %task_id, chat_id = %chat_id, "workflow C enqueued onto model queue"),
            Err(e) => error!(chat_id = %chat_id, error = %e, "failed to enqueue workflow C"),
        }
    }

    async fn dispatch_all(&self, chat_id: ChatId, session_id: String, context_data: Value) {
        let executor = self.executor.clone();
        let result_sink = self.result_sink.clone();
        let mut tasks = self.active_tasks.lock().await;
        tasks.spawn(async move {
            let result = executor.execute_workflow_c(chat_id, session_id, context_data).await;
            result_sink.deliver(result).await;
        });
    }

    /// Cancels and drains any in-flight detached workflow-C tasks spawned
    /// under `all` mode.
    pub async fn shutdown(&self) {
        let mut tasks = self.active_tasks.lock().await;
        tasks.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orch_core::Shutdown;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Mutex as TokioMutex;

    struct EchoExecutor(Arc<AtomicUsize>);

    #[async_trait]
    impl WorkflowCExecutor for EchoExecutor {
        async fn execute_workflow_c(&self, chat_id: ChatId, session_id: String, _context_data: Value) -> Value {
            self.0.fetch_add(1, Ordering::SeqCst);
            serde_json::json!({"chat_id": chat_id.as_str(), "session_id": session_id, "success": true})
        }
    }

    struct NoopHandler;
    #[async_trait]
    impl orch_queue::TaskHandler for NoopHandler {
        async fn handle_task(&self, _task: orch_queue::QueueTask) -> Option<Value> {
            None
        }
    }

    struct RecordingSink(Arc<TokioMutex<Vec<Value>>>);
    #[async_trait]
    impl ResultSink for RecordingSink {
        async fn deliver(&self, result: Value) {
            self.0.lock().await.push(result);
        }
    }

    #[tokio::test]
    async fn wait_mode_enqueues_onto_model_queue() {
        let delivered = Arc::new(TokioMutex::new(Vec::new()));
        let queue = QueueManager::new(Arc::new(NoopHandler), Arc::new(RecordingSink(delivered.clone())), Shutdown::new());
        let executed = Arc::new(AtomicUsize::new(0));
        let rules = RulesManager::new(
            RulesManagerConfig { mode: RulesMode::Wait },
            queue.clone(),
            Arc::new(EchoExecutor(executed.clone())),
            Arc::new(RecordingSink(delivered.clone())),
        );

        rules
            .handle_workflow_b_result(ChatId::from("c1"), "sess_1".to_string(), serde_json::json!({}))
            .await;
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        assert_eq!(executed.load(Ordering::SeqCst), 0);
        let status = queue.status();
        assert_eq!(status.model.unwrap().active_consumers, 1);
    }

    #[tokio::test]
    async fn all_mode_runs_executor_directly_and_delivers_result() {
        let delivered = Arc::new(TokioMutex::new(Vec::new()));
        let queue = QueueManager::new(Arc::new(NoopHandler), Arc::new(RecordingSink(delivered.clone())), Shutdown::new());
        let executed = Arc::new(AtomicUsize::new(0));
        let rules = RulesManager::new(
            RulesManagerConfig { mode: RulesMode::All },
            queue,
            Arc::new(EchoExecutor(executed.clone())),
            Arc::new(RecordingSink(delivered.clone())),
        );

        rules
            .handle_workflow_b_result(ChatId::from("c1"), "sess_1".to_string(), serde_json::json!({}))
            .await;
        rules.shutdown().await;

        assert_eq!(executed.load(Ordering::SeqCst), 1);
        let results = delivered.lock().await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0]["chat_id"], "c1");
    }
}
