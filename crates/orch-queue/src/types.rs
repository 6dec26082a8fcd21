use orch_core::{ChatId, WorkflowType};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Capacity of every per-chat queue, matching the original's
/// `asyncio.Queue(maxsize=1000)`. Not exposed via config — only the
/// consumer poll timeout and the task-id scheme are configurable.
pub const QUEUE_CAPACITY: usize = 1000;

/// How long a consumer blocks on an empty queue before checking the
/// shutdown signal again, matching the original's
/// `asyncio.wait_for(queue.get(), timeout=1.0)`.
pub const POLL_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(1);

/// A unit of work handed from the Queue manager to the Workflow engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueTask {
    pub task_id: String,
    pub chat_id: ChatId,
    pub task_data: Value,
    pub workflow_type: WorkflowType,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueKind {
    Message,
    Model,
}

impl QueueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueKind::Message => "message",
            QueueKind::Model => "llm",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueSnapshot {
    pub total_chats: usize,
    pub total_tasks: usize,
    pub active_consumers: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct QueueManagerStatus {
    pub message: Option<QueueSnapshot>,
    pub model: Option<QueueSnapshot>,
}
