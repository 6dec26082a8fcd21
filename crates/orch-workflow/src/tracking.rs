use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use dashmap::DashMap;
use orch_sessions::SessionId;

/// Lifecycle state of one tool-call attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolCallStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Timeout,
}

/// One attempt at executing a model-requested tool call, tracked for the
/// lifetime of its owning session.
#[derive(Debug, Clone)]
pub struct ToolCallRecord {
    pub tool_call_id: String,
    pub session_id: SessionId,
    pub tool_name: String,
    pub status: ToolCallStatus,
    pub start_time: Instant,
    pub result: Option<String>,
}

/// Called by the tool loop around every attempt so the owner can maintain
/// tool-call tracking records.
#[async_trait]
pub trait ToolCallObserver: Send + Sync {
    async fn on_start(&self, session_id: &SessionId, tool_call_id: &str, tool_name: &str);
    async fn on_finish(&self, session_id: &SessionId, tool_call_id: &str, status: ToolCallStatus, result: &str);
}

/// Used where a caller has no need to observe individual attempts (e.g. the
/// tool loop's own unit tests).
pub struct NoopObserver;

#[async_trait]
impl ToolCallObserver for NoopObserver {
    async fn on_start(&self, _session_id: &SessionId, _tool_call_id: &str, _tool_name: &str) {}
    async fn on_finish(&self, _session_id: &SessionId, _tool_call_id: &str, _status: ToolCallStatus, _result: &str) {}
}

/// Owns tool-call tracking records keyed by session, per the data model's
/// "updated for every attempt and cleared when the owning session is
/// cleaned up". The workflow engine registers [`Self::clear_session`] as the
/// Session store's cleanup callback.
#[derive(Default)]
pub struct ToolCallTracker {
    records: DashMap<SessionId, Vec<ToolCallRecord>>,
}

impl ToolCallTracker {
    pub fn new() -> Self {
        Self { records: DashMap::new() }
    }

    pub fn clear_session(&self, session_id: &SessionId) {
        self.records.remove(session_id);
    }

    pub fn records_for(&self, session_id: &SessionId) -> Vec<ToolCallRecord> {
        self.records.get(session_id).map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ToolCallObserver for ToolCallTracker {
    async fn on_start(&self, session_id: &SessionId, tool_call_id: &str, tool_name: &str) {
        let record = ToolCallRecord {
            tool_call_id: tool_call_id.to_string(),
            session_id: session_id.clone(),
            tool_name: tool_name.to_string(),
            status: ToolCallStatus::Running,
            start_time: Instant::now(),
            result: None,
        };
        self.records.entry(session_id.clone()).or_default().push(record);
    }

    async fn on_finish(&self, session_id: &SessionId, tool_call_id: &str, status: ToolCallStatus, result: &str) {
        if let Some(mut entries) = self.records.get_mut(session_id) {
            if let Some(record) = entries.iter_mut().rev().find(|r| r.tool_call_id == tool_call_id) {
                record.status = status;
                record.result = Some(result.to_string());
            }
        }
    }
}

pub type SharedToolCallObserver = Arc<dyn ToolCallObserver>;

#[cfg(test)]
mod tests {
    use super::*;
    use orch_core::ChatId;

    fn sid() -> SessionId {
        SessionId("sess_c1_1_0_abcdef12".to_string())
    }

    #[tokio::test]
    async fn records_start_then_finish() {
        let _ = ChatId::from("c1");
        let tracker = ToolCallTracker::new();
        tracker.on_start(&sid(), "call_1", "echo_tool").await;
        tracker.on_finish(&sid(), "call_1", ToolCallStatus::Completed, "ok").await;

        let records = tracker.records_for(&sid());
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, ToolCallStatus::Completed);
        assert_eq!(records[0].result.as_deref(), Some("ok"));
    }

    #[tokio::test]
    async fn clear_session_drops_its_records() {
        let tracker = ToolCallTracker::new();
        tracker.on_start(&sid(), "call_1", "echo_tool").await;
        tracker.clear_session(&sid());
        assert!(tracker.records_for(&sid()).is_empty());
    }
}
