use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use orch_context::ChatContext;
use orch_core::{ChatId, ImageResolver, Message, NoImages, Role, Shutdown, ToolCallFunction, ToolCallRequest};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{Result, SessionError};
use crate::reshape::reshape_snapshot;
use crate::types::{generate_session_id, SessionData, SessionId};

/// One live session: its data plus whatever the session mutex guards while
/// workflow C's tool loop runs.
pub struct SessionEntry {
    pub data: SessionData,
}

#[derive(Clone, Copy)]
pub struct SessionStoreConfig {
    pub session_timeout_minutes: u64,
    pub max_sessions: usize,
}

/// Ephemeral per-turn session store. Sessions are created by workflow B from
/// a context snapshot and consumed (and discarded) by workflow C; nothing
/// here is persisted to disk. Grounded on `session_manager.py`'s
/// `SessionManager`, rebuilt around a `DashMap` of per-session mutexes
/// rather than a single global lock.
pub struct SessionStore {
    sessions: DashMap<SessionId, Arc<Mutex<SessionEntry>>>,
    chat_index: DashMap<ChatId, Vec<SessionId>>,
    config: SessionStoreConfig,
    images: Arc<dyn ImageResolver>,
}

impl SessionStore {
    pub fn new(config: SessionStoreConfig) -> Self {
        Self::with_image_resolver(config, Arc::new(NoImages))
    }

    pub fn with_image_resolver(config: SessionStoreConfig, images: Arc<dyn ImageResolver>) -> Self {
        Self {
            sessions: DashMap::new(),
            chat_index: DashMap::new(),
            config,
            images,
        }
    }

    /// Reshapes `context` into a fresh session and registers it.
    pub async fn create(&self, context: &ChatContext) -> SessionId {
        let session_id = generate_session_id(&context.chat_id);
        let data = reshape_snapshot(context, self.images.clone()).await;
        let now = chrono::Utc::now();
        let entry = SessionData {
            session_id: session_id.clone(),
            chat_id: context.chat_id.clone(),
            created_at: now,
            last_updated: now,
            data,
            tool_call_count: 0,
        };
        self.sessions
            .insert(session_id.clone(), Arc::new(Mutex::new(SessionEntry { data: entry })));
        self.chat_index
            .entry(context.chat_id.clone())
            .or_default()
            .push(session_id.clone());
        self.enforce_capacity();
        debug!(session_id = %session_id, chat_id = %context.chat_id, "session created");
        session_id
    }

    /// Returns the per-session mutex used to serialize a tool-call batch
    /// against concurrent dispatch of the same session.
    pub fn acquire(&self, session_id: &SessionId) -> Option<Arc<Mutex<SessionEntry>>> {
        self.sessions.get(session_id).map(|e| e.clone())
    }

    pub async fn get(&self, session_id: &SessionId) -> Result<SessionData> {
        let entry = self
            .sessions
            .get(session_id)
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;
        let guard = entry.lock().await;
        Ok(guard.data.clone())
    }

    /// Appends the assistant's tool-call request to the session transcript.
    /// Caller must already hold the session's mutex (via [`Self::acquire`]).
    pub fn add_tool_call_message(&self, entry: &mut SessionEntry, calls: Vec<ToolCallRequest>) {
        entry.data.data.messages.push(Message::assistant_tool_calls(calls));
        entry.data.last_updated = chrono::Utc::now();
    }

    /// Appends the tool results and bumps the call counter that enforces
    /// `max_tool_calls`.
    pub fn add_tool_results(&self, entry: &mut SessionEntry, results: Vec<(String, String, String)>) {
        entry.data.tool_call_count += results.len() as u32;
        for (tool_call_id, name, content) in results {
            entry.data.data.messages.push(Message::tool_result(tool_call_id, name, content));
        }
        entry.data.last_updated = chrono::Utc::now();
    }

    pub fn tool_call_count(&self, entry: &SessionEntry) -> u32 {
        entry.data.tool_call_count
    }

    pub fn append_assistant_text(&self, entry: &mut SessionEntry, text: impl Into<String>) {
        entry.data.data.messages.push(Message::assistant_text(text));
        entry.data.last_updated = chrono::Utc::now();
    }

    pub fn get_sessions_by_chat_id(&self, chat_id: &ChatId) -> Vec<SessionId> {
        self.chat_index.get(chat_id).map(|v| v.clone()).unwrap_or_default()
    }

    /// Removes a session once workflow C has produced its final reply.
    pub fn cleanup(&self, session_id: &SessionId) {
        if let Some((_, entry)) = self.sessions.remove(session_id) {
            let chat_id = entry.try_lock().ok().map(|g| g.data.chat_id.clone());
            if let Some(chat_id) = chat_id {
                self.remove_from_index(&chat_id, session_id);
            }
            debug!(session_id = %session_id, "session cleaned up");
        }
    }

    fn remove_from_index(&self, chat_id: &ChatId, session_id: &SessionId) {
        if let Some(mut ids) = self.chat_index.get_mut(chat_id) {
            ids.retain(|id| id != session_id);
        }
    }

    fn enforce_capacity(&self) {
        if self.sessions.len() <= self.config.max_sessions {
            return;
        }
        let mut by_age: Vec<(SessionId, chrono::DateTime<chrono::Utc>)> = self
            .sessions
            .iter()
            .filter_map(|e| e.value().try_lock().ok().map(|g| (e.key().clone(), g.data.last_updated)))
            .collect();
        by_age.sort_by_key(|(_, last_updated)| *last_updated);
        let overflow = self.sessions.len().saturating_sub(self.config.max_sessions);
        for (session_id, _) in by_age.into_iter().take(overflow) {
            warn!(session_id = %session_id, "evicting session over capacity");
            self.cleanup(&session_id);
        }
    }

    fn is_expired(&self, entry: &SessionEntry) -> bool {
        let age = chrono::Utc::now().signed_duration_since(entry.data.last_updated);
        age.num_minutes() >= self.config.session_timeout_minutes as i64
    }

    fn sweep_expired(&self) {
        let expired: Vec<SessionId> = self
            .sessions
            .iter()
            .filter_map(|e| match e.value().try_lock() {
                Ok(guard) if self.is_expired(&guard) => Some(e.key().clone()),
                _ => None,
            })
            .collect();
        for session_id in expired {
            info!(session_id = %session_id, "session expired");
            self.cleanup(&session_id);
        }
    }

    /// Periodic expiry sweep, mirroring the Context store's eviction daemon.
    pub async fn run_expiry_daemon(self: Arc<Self>, shutdown: Shutdown) {
        let mut ticker = tokio::time::interval(Duration::from_secs(60));
        loop {
            tokio::select! {
                _ = ticker.tick() => self.sweep_expired(),
                _ = shutdown.cancelled() => {
                    info!("session expiry daemon shutting down");
                    break;
                }
            }
        }
    }
}

/// Renders a model-requested tool call's decoded arguments for logging,
/// independent of the JSON body shape. Kept trivial on purpose.
pub fn describe_call(call: &ToolCallFunction) -> String {
    format!("{}({})", call.name, call.arguments)
}

pub fn is_user_message(message: &Message) -> bool {
    message.role == Role::User
}

#[cfg(test)]
mod tests {
    use super::*;
    use orch_context::ChatData;
    use orch_core::{ChatMode, Content};

    fn sample_context() -> ChatContext {
        ChatContext {
            chat_id: ChatId::from("c1"),
            chat_mode: ChatMode::Llm,
            tools_call: false,
            data: ChatData {
                model: "m".to_string(),
                messages: vec![Message::system("core"), Message::user(Content::text("hi"))],
                max_tokens: 10,
                temperature: 0.5,
                stream: false,
                tools: None,
            },
        }
    }

    fn store() -> SessionStore {
        SessionStore::new(SessionStoreConfig {
            session_timeout_minutes: 5,
            max_sessions: 100,
        })
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let store = store();
        let id = store.create(&sample_context()).await;
        let data = store.get(&id).await.unwrap();
        assert_eq!(data.tool_call_count, 0);
        assert_eq!(data.chat_id, ChatId::from("c1"));
    }

    #[tokio::test]
    async fn get_missing_session_errors() {
        let store = store();
        let err = store.get(&SessionId("sess_missing".to_string())).await.unwrap_err();
        assert!(matches!(err, SessionError::NotFound(_)));
    }

    #[tokio::test]
    async fn acquire_serializes_mutations() {
        let store = store();
        let id = store.create(&sample_context()).await;
        let entry = store.acquire(&id).unwrap();
        let mut guard = entry.lock().await;
        store.add_tool_results(
            &mut guard,
            vec![("call_1".to_string(), "echo".to_string(), "ok".to_string())],
        );
        assert_eq!(guard.data.tool_call_count, 1);
    }

    #[tokio::test]
    async fn capacity_eviction_drops_oldest() {
        let store = SessionStore::new(SessionStoreConfig {
            session_timeout_minutes: 5,
            max_sessions: 1,
        });
        let first = store.create(&sample_context()).await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        let _second = store.create(&sample_context()).await;
        assert!(store.get(&first).await.is_err());
    }

    #[tokio::test]
    async fn cleanup_removes_from_chat_index() {
        let store = store();
        let id = store.create(&sample_context()).await;
        assert_eq!(store.get_sessions_by_chat_id(&ChatId::from("c1")), vec![id.clone()]);
        store.cleanup(&id);
        assert!(store.get_sessions_by_chat_id(&ChatId::from("c1")).is_empty());
    }
}
