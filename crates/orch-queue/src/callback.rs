use async_trait::async_trait;
use serde_json::Value;

use crate::types::QueueTask;

/// The Workflow engine's entry point: invoked once per dequeued task and
/// returns the task result (if any) that should be handed to the
/// [`ResultSink`] — e.g. a B result the Rules manager needs to see, or a C
/// response envelope the Port manager should deliver.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle_task(&self, task: QueueTask) -> Option<Value>;
}

/// Agent core's sink for task results that should leave the queue
/// subsystem (a completed workflow's response envelope, a command's
/// immediate reply).
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn deliver(&self, result: Value);
}
