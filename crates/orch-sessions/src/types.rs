use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use orch_context::ChatData;
use orch_core::ChatId;
use serde::{Deserialize, Serialize};

/// Unique per-creation session identifier shaped
/// `sess_{chat_id}_{unix_ts}_{counter}_{hex8}`, matching
/// `session_manager.py::_generate_session_id` so sessions stay
/// grep-able in logs across both implementations.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

static SESSION_COUNTER: AtomicU64 = AtomicU64::new(0);

pub(crate) fn generate_session_id(chat_id: &ChatId) -> SessionId {
    let counter = SESSION_COUNTER.fetch_add(1, Ordering::Relaxed);
    let unix_ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let unique = uuid::Uuid::new_v4().simple().to_string();
    SessionId(format!(
        "sess_{}_{}_{}_{}",
        chat_id.as_str(),
        unix_ts,
        counter,
        &unique[..8]
    ))
}

/// Ephemeral per-turn state consumed by workflow C.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionData {
    pub session_id: SessionId,
    pub chat_id: ChatId,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub last_updated: chrono::DateTime<chrono::Utc>,
    pub data: ChatData,
    pub tool_call_count: u32,
}
