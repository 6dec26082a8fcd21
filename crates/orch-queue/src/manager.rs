use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use orch_core::{ChatId, Shutdown, WorkflowType};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::callback::{ResultSink, TaskHandler};
use crate::error::{QueueError, Result};
use crate::types::{QueueKind, QueueManagerStatus, QueueSnapshot, QueueTask, POLL_TIMEOUT, QUEUE_CAPACITY};

struct ChatQueue {
    sender: mpsc::Sender<QueueTask>,
    consumer: JoinHandle<()>,
    depth: Arc<std::sync::atomic::AtomicUsize>,
}

/// Per-chat message queue + per-chat model queue, each with exactly one
/// consumer, created lazily on first enqueue for that chat. Grounded on
/// `queue_manager.py::QueueManager`, rebuilt around bounded `tokio::mpsc`
/// channels instead of `asyncio.Queue`.
pub struct QueueManager {
    message_queues: DashMap<ChatId, ChatQueue>,
    model_queues: DashMap<ChatId, ChatQueue>,
    task_counter: AtomicU64,
    task_handler: Arc<dyn TaskHandler>,
    result_sink: Arc<dyn ResultSink>,
    shutdown: Shutdown,
}

impl QueueManager {
    pub fn new(task_handler: Arc<dyn TaskHandler>, result_sink: Arc<dyn ResultSink>, shutdown: Shutdown) -> Arc<Self> {
        Arc::new(Self {
            message_queues: DashMap::new(),
            model_queues: DashMap::new(),
            task_counter: AtomicU64::new(0),
            task_handler,
            result_sink,
            shutdown,
        })
    }

    fn next_task_id(&self) -> String {
        let n = self.task_counter.fetch_add(1, Ordering::Relaxed);
        format!("task_{}_{}", n, chrono::Utc::now().timestamp())
    }

    /// Enqueues a user-originated message. `is_respond` selects workflow
    /// `B` (model reply expected) vs `A` (ambient update). Requires
    /// `task_data.chat_id` and `task_data.is_respond`.
    pub async fn enqueue_message(self: &Arc<Self>, chat_id: ChatId, task_data: Value) -> Result<String> {
        if task_data.get("chat_id").is_none() {
            return Err(QueueError::MissingField("chat_id"));
        }
        let is_respond = task_data
            .get("is_respond")
            .and_then(Value::as_bool)
            .ok_or(QueueError::MissingField("is_respond"))?;
        let workflow_type = if is_respond { WorkflowType::B } else { WorkflowType::A };
        self.enqueue(QueueKind::Message, chat_id, task_data, workflow_type).await
    }

    /// Enqueues a model-turn task (workflow `C` only). Requires
    /// `task_data.chat_id`.
    pub async fn enqueue_llm(self: &Arc<Self>, chat_id: ChatId, task_data: Value) -> Result<String> {
        if task_data.get("chat_id").is_none() {
            return Err(QueueError::MissingField("chat_id"));
        }
        self.enqueue(QueueKind::Model, chat_id, task_data, WorkflowType::C).await
    }

    async fn enqueue(self: &Arc<Self>, kind: QueueKind, chat_id: ChatId, task_data: Value, workflow_type: WorkflowType) -> Result<String> {
        if self.shutdown.is_cancelled() {
            return Err(QueueError::ShuttingDown);
        }
        let task = QueueTask {
            task_id: self.next_task_id(),
            chat_id: chat_id.clone(),
            task_data,
            workflow_type,
            created_at: chrono::Utc::now(),
        };
        let queues = match kind {
            QueueKind::Message => &self.message_queues,
            QueueKind::Model => &self.model_queues,
        };
        let (sender, depth) = if let Some(q) = queues.get(&chat_id) {
            (q.sender.clone(), q.depth.clone())
        } else {
            self.spawn_consumer(kind, chat_id.clone())
        };
        let task_id = task.task_id.clone();
        match sender.try_send(task) {
            Ok(()) => {
                depth.fetch_add(1, Ordering::Relaxed);
                debug!(task_id = %task_id, chat_id = %chat_id, queue = kind.as_str(), "task enqueued");
                Ok(task_id)
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                error!(chat_id = %chat_id, queue = kind.as_str(), "queue full");
                Err(QueueError::Full)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                error!(chat_id = %chat_id, queue = kind.as_str(), "queue consumer closed");
                Err(QueueError::ShuttingDown)
            }
        }
    }

    fn spawn_consumer(self: &Arc<Self>, kind: QueueKind, chat_id: ChatId) -> (mpsc::Sender<QueueTask>, Arc<std::sync::atomic::AtomicUsize>) {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        let depth = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let manager = self.clone();
        let consumer_chat_id = chat_id.clone();
        let consumer_depth = depth.clone();
        let handle = tokio::spawn(async move {
            manager.consumer_loop(kind, consumer_chat_id, rx, consumer_depth).await;
        });
        let queues = match kind {
            QueueKind::Message => &self.message_queues,
            QueueKind::Model => &self.model_queues,
        };
        queues.insert(
            chat_id,
            ChatQueue {
                sender: tx.clone(),
                consumer: handle,
                depth: depth.clone(),
            },
        );
        (tx, depth)
    }

    async fn consumer_loop(
        self: Arc<Self>,
        kind: QueueKind,
        chat_id: ChatId,
        mut rx: mpsc::Receiver<QueueTask>,
        depth: Arc<std::sync::atomic::AtomicUsize>,
    ) {
        debug!(chat_id = %chat_id, queue = kind.as_str(), "consumer started");
        loop {
            let next = tokio::select! {
                next = tokio::time::timeout(POLL_TIMEOUT, rx.recv()) => next,
                _ = self.shutdown.cancelled() => break,
            };
            let task = match next {
                Ok(Some(task)) => task,
                Ok(None) => break,
                Err(_) => continue,
            };
            depth.fetch_sub(1, Ordering::Relaxed);
            let task_id = task.task_id.clone();
            match self.task_handler.handle_task(task).await {
                Some(result) => self.result_sink.deliver(result).await,
                None => {}
            }
            debug!(task_id = %task_id, "task processed");
        }
        debug!(chat_id = %chat_id, queue = kind.as_str(), "consumer stopped");
    }

    fn snapshot(queues: &DashMap<ChatId, ChatQueue>) -> QueueSnapshot {
        let total_chats = queues.len();
        let total_tasks = queues.iter().map(|e| e.depth.load(Ordering::Relaxed)).sum();
        QueueSnapshot {
            total_chats,
            total_tasks,
            active_consumers: queues.iter().filter(|e| !e.consumer.is_finished()).count(),
        }
    }

    pub fn status(&self) -> QueueManagerStatus {
        QueueManagerStatus {
            message: Some(Self::snapshot(&self.message_queues)),
            model: Some(Self::snapshot(&self.model_queues)),
        }
    }

    /// Cancels every consumer task and drains remaining items, discarding
    /// them.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        Self::drain_and_join(&self.message_queues, "message").await;
        Self::drain_and_join(&self.model_queues, "llm").await;
    }

    async fn drain_and_join(queues: &DashMap<ChatId, ChatQueue>, label: &str) {
        let chat_ids: Vec<ChatId> = queues.iter().map(|e| e.key().clone()).collect();
        for chat_id in chat_ids {
            if let Some((_, queue)) = queues.remove(&chat_id) {
                if let Err(e) = queue.consumer.await {
                    warn!(error = %e, queue = label, "consumer join failed");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tokio::sync::Mutex as TokioMutex;

    struct EchoHandler;

    #[async_trait]
    impl TaskHandler for EchoHandler {
        async fn handle_task(&self, task: QueueTask) -> Option<Value> {
            Some(serde_json::json!({ "task_id": task.task_id, "workflow_type": task.workflow_type }))
        }
    }

    struct BlockingHandler {
        started: Arc<tokio::sync::Notify>,
    }

    #[async_trait]
    impl TaskHandler for BlockingHandler {
        async fn handle_task(&self, _task: QueueTask) -> Option<Value> {
            self.started.notify_one();
            std::future::pending::<()>().await;
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

    fn build() -> (Arc<QueueManager>, Arc<TokioMutex<Vec<Value>>>) {
        let delivered = Arc::new(TokioMutex::new(Vec::new()));
        let manager = QueueManager::new(Arc::new(EchoHandler), Arc::new(RecordingSink(delivered.clone())), Shutdown::new());
        (manager, delivered)
    }

    #[tokio::test]
    async fn message_queue_routes_by_is_respond() {
        let (manager, delivered) = build();
        let chat_id = ChatId::from("c1");
        manager
            .enqueue_message(chat_id.clone(), serde_json::json!({"chat_id": "c1", "is_respond": true}))
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let results = delivered.lock().await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0]["workflow_type"], "B");
    }

    #[tokio::test]
    async fn enqueue_message_requires_is_respond() {
        let (manager, _) = build();
        let err = manager
            .enqueue_message(ChatId::from("c1"), serde_json::json!({"chat_id": "c1"}))
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::MissingField("is_respond")));
    }

    #[tokio::test]
    async fn enqueue_llm_is_always_workflow_c() {
        let (manager, delivered) = build();
        manager
            .enqueue_llm(ChatId::from("c1"), serde_json::json!({"chat_id": "c1"}))
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let results = delivered.lock().await;
        assert_eq!(results[0]["workflow_type"], "C");
    }

    #[tokio::test]
    async fn status_reports_active_consumer() {
        let (manager, _) = build();
        manager
            .enqueue_message(ChatId::from("c1"), serde_json::json!({"chat_id": "c1", "is_respond": false}))
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let status = manager.status();
        assert_eq!(status.message.unwrap().active_consumers, 1);
    }

    #[tokio::test]
    async fn enqueue_returns_full_when_the_channel_is_saturated_rather_than_shutting_down() {
        let started = Arc::new(tokio::sync::Notify::new());
        let delivered = Arc::new(TokioMutex::new(Vec::new()));
        let manager = QueueManager::new(Arc::new(BlockingHandler { started: started.clone() }), Arc::new(RecordingSink(delivered)), Shutdown::new());
        let chat_id = ChatId::from("c1");

        manager
            .enqueue_message(chat_id.clone(), serde_json::json!({"chat_id": "c1", "is_respond": false}))
            .await
            .unwrap();
        started.notified().await;

        for _ in 0..QUEUE_CAPACITY {
            manager
                .enqueue_message(chat_id.clone(), serde_json::json!({"chat_id": "c1", "is_respond": false}))
                .await
                .unwrap();
        }

        let err = manager
            .enqueue_message(chat_id.clone(), serde_json::json!({"chat_id": "c1", "is_respond": false}))
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::Full), "a saturated queue must report Full, not the shutdown error");
    }

    #[tokio::test]
    async fn shutdown_joins_all_consumers() {
        let (manager, _) = build();
        manager
            .enqueue_message(ChatId::from("c1"), serde_json::json!({"chat_id": "c1", "is_respond": false}))
            .await
            .unwrap();
        manager.shutdown().await;
        let status = manager.status();
        assert_eq!(status.message.unwrap().total_chats, 0);
    }
}
