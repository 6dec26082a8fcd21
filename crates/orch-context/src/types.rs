use orch_core::{ChatId, ChatMode, Message, ToolDefinition};
use serde::{Deserialize, Serialize};

/// Generation parameters and message history carried in a chat's `data`
/// sub-object, matching the OpenAI Chat Completions input shape plus the
/// tool schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatData {
    pub model: String,
    pub messages: Vec<Message>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub stream: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDefinition>>,
}

/// Persistent per-chat conversation state, one per `chat_id`, owned by the
/// Context store and mirrored one-for-one onto `history/<safe_chat_id>.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatContext {
    pub chat_id: ChatId,
    pub chat_mode: ChatMode,
    pub tools_call: bool,
    pub data: ChatData,
}

impl ChatContext {
    pub fn count_user_messages(&self) -> usize {
        self.data
            .messages
            .iter()
            .filter(|m| m.role == orch_core::Role::User)
            .count()
    }
}

/// In-memory cache entry: the context plus bookkeeping the store needs that
/// is never itself persisted to disk.
pub struct CachedContext {
    pub context: ChatContext,
    pub dirty: bool,
    pub last_access: std::time::Instant,
}

/// Snapshot of the context store's cache for diagnostics, returned by
/// `ContextStore::status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextStoreStatus {
    pub cached_chats: usize,
    pub dirty_chats: usize,
}
