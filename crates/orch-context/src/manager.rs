use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use orch_core::config::ContextStoreConfig;
use orch_core::{ChatId, ChatMode, Content, Message, MessagePart, Role, Shutdown, ToolSchemaProvider};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::error::{ContextError, Result};
use crate::path::context_file_path;
use crate::trim::trim_dialogue_rounds;
use crate::types::{CachedContext, ChatContext, ChatData, ContextStoreStatus};

/// Per-chat conversation state: a write-back cache over one JSON file per
/// chat under `history/`. Grounded on `context_manager.py::ContextManager`
/// (cache dict + dirty-flag + periodic flush) and, for the general cache
/// shape, `skynet-memory/src/manager.rs::MemoryManager`.
pub struct ContextStore {
    cache: Mutex<HashMap<ChatId, CachedContext>>,
    config: ContextStoreConfig,
    tool_schema: Arc<dyn ToolSchemaProvider>,
}

impl ContextStore {
    pub fn new(config: ContextStoreConfig, tool_schema: Arc<dyn ToolSchemaProvider>) -> Self {
        Self {
            cache: Mutex::new(HashMap::new()),
            config,
            tool_schema,
        }
    }

    fn default_chat_mode(&self) -> ChatMode {
        if !self.config.chat_mode.llm_models.is_empty() {
            ChatMode::Llm
        } else {
            ChatMode::Mllm
        }
    }

    fn default_context(&self, chat_id: &ChatId) -> ChatContext {
        let tools = self.tool_schema.current_schema();
        ChatContext {
            chat_id: chat_id.clone(),
            chat_mode: self.default_chat_mode(),
            tools_call: self.config.default_tools_call,
            data: ChatData {
                model: self.config.default_model.clone(),
                messages: vec![Message::system(self.config.joined_core_prompt())],
                max_tokens: self.config.max_tokens,
                temperature: self.config.temperature,
                stream: self.config.stream,
                tools: if tools.is_empty() { None } else { Some(tools) },
            },
        }
    }

    /// Loads `chat_id`'s file from disk, or builds a fresh default context if
    /// it is missing or unreadable. Returns whether the result is newly
    /// created (i.e. should be marked dirty so it gets persisted).
    async fn load_or_default(&self, chat_id: &ChatId) -> (ChatContext, bool) {
        let path = context_file_path(&self.config.history_dir, chat_id.as_str());
        match tokio::fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice::<ChatContext>(&bytes) {
                Ok(ctx) => (ctx, false),
                Err(e) => {
                    warn!(chat_id = %chat_id, error = %e, "malformed context file, recreating default");
                    (self.default_context(chat_id), true)
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => (self.default_context(chat_id), true),
            Err(e) => {
                warn!(chat_id = %chat_id, error = %e, "failed to read context file, recreating default");
                (self.default_context(chat_id), true)
            }
        }
    }

    async fn write_through(&self, context: &ChatContext) -> Result<()> {
        let path = context_file_path(&self.config.history_dir, context.chat_id.as_str());
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ContextError::Io { chat_id: context.chat_id.to_string(), source: e })?;
        }
        let bytes = serde_json::to_vec_pretty(context)
            .map_err(|e| ContextError::Serde { chat_id: context.chat_id.to_string(), source: e })?;
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| ContextError::Io { chat_id: context.chat_id.to_string(), source: e })?;
        debug!(chat_id = %context.chat_id, "context written to disk");
        Ok(())
    }

    async fn flush_if_dirty(&self, chat_id: &ChatId, cache: &mut HashMap<ChatId, CachedContext>) {
        if let Some(entry) = cache.get(chat_id) {
            if entry.dirty {
                if let Err(e) = self.write_through(&entry.context).await {
                    error!(chat_id = %chat_id, error = %e, "failed to flush dirty context");
                }
            }
        }
    }

    /// `get(chat_id)`: cache hit touches `last_access`; cache miss loads
    /// from disk or creates a default (dirty iff newly created).
    pub async fn get(&self, chat_id: &ChatId) -> ChatContext {
        let mut cache = self.cache.lock().await;
        if let Some(entry) = cache.get_mut(chat_id) {
            entry.last_access = Instant::now();
            return entry.context.clone();
        }
        drop(cache);

        let (context, is_new) = self.load_or_default(chat_id).await;
        let mut cache = self.cache.lock().await;
        let result = context.clone();
        cache.insert(
            chat_id.clone(),
            CachedContext {
                context,
                dirty: is_new,
                last_access: Instant::now(),
            },
        );
        if is_new {
            info!(chat_id = %chat_id, "created default context");
        }
        result
    }

    /// `update(chat_id, entry)`: append a `user` or `assistant` message and
    /// re-run trimming.
    pub async fn update(&self, chat_id: &ChatId, mut entry: Message) -> Result<()> {
        debug_assert!(matches!(entry.role, Role::User | Role::Assistant));
        if entry.role == Role::User {
            if let Some(content) = entry.content.take() {
                entry.content = Some(reduce_user_content_for_storage(content));
            }
        }

        // Ensure the chat is cached before mutating.
        self.get(chat_id).await;

        let mut cache = self.cache.lock().await;
        let cached = cache.get_mut(chat_id).expect("just populated by get()");
        cached.context.data.messages.push(entry);
        cached.dirty = true;
        cached.last_access = Instant::now();
        trim_dialogue_rounds(&mut cached.context.data.messages, self.config.max_user_messages_per_chat);
        Ok(())
    }

    /// Shared mutator discipline: flush-if-dirty, evict, reload from disk
    /// (or recreate defaults), apply `edit`, write through immediately,
    /// repopulate the cache. Grounded on `context_manager.py`'s
    /// `update_model`/`update_tools_call`/`set_custom_prompt`/etc., which
    /// all share exactly this shape.
    async fn mutate_with_reload<F>(&self, chat_id: &ChatId, edit: F) -> Result<ChatContext>
    where
        F: FnOnce(&mut ChatContext),
    {
        let mut cache = self.cache.lock().await;
        self.flush_if_dirty(chat_id, &mut cache).await;
        cache.remove(chat_id);
        drop(cache);

        let (mut context, _) = self.load_or_default(chat_id).await;
        edit(&mut context);
        self.write_through(&context).await?;

        let mut cache = self.cache.lock().await;
        let result = context.clone();
        cache.insert(
            chat_id.clone(),
            CachedContext {
                context,
                dirty: false,
                last_access: Instant::now(),
            },
        );
        Ok(result)
    }

    pub async fn set_model(&self, chat_id: &ChatId, model: String) -> Result<()> {
        self.mutate_with_reload(chat_id, |ctx| ctx.data.model = model).await?;
        Ok(())
    }

    pub async fn set_tools_call(&self, chat_id: &ChatId, enabled: bool) -> Result<()> {
        self.mutate_with_reload(chat_id, |ctx| ctx.tools_call = enabled).await?;
        Ok(())
    }

    /// `set_custom_prompt(text)`: system message becomes `text + "\n" +
    /// core_prompt` when `text` is non-empty, else `core_prompt` alone.
    pub async fn set_custom_prompt(&self, chat_id: &ChatId, text: String) -> Result<()> {
        let core_prompt = self.config.joined_core_prompt();
        self.mutate_with_reload(chat_id, move |ctx| {
            let system_text = if text.is_empty() {
                core_prompt
            } else {
                format!("{}\n{}", text, core_prompt)
            };
            if let Some(system) = ctx.data.messages.first_mut() {
                system.content = Some(Content::Text(system_text));
            }
        })
        .await?;
        Ok(())
    }

    pub async fn delete_custom_prompt(&self, chat_id: &ChatId) -> Result<()> {
        self.set_custom_prompt(chat_id, String::new()).await
    }

    /// `(custom_prompt_text, has_custom_prompt)` — determined by whether the
    /// system message content equals (`false`) or merely contains
    /// (`true`) `core_prompt`.
    pub async fn get_custom_prompt(&self, chat_id: &ChatId) -> (String, bool) {
        let context = self.get(chat_id).await;
        let core_prompt = self.config.joined_core_prompt();
        let system_text = context
            .data
            .messages
            .first()
            .and_then(|m| m.text())
            .unwrap_or_default();

        if system_text == core_prompt {
            (String::new(), false)
        } else if let Some(prefix) = system_text.strip_suffix(&format!("\n{}", core_prompt)) {
            (prefix.to_string(), true)
        } else {
            (system_text, true)
        }
    }

    pub async fn set_tools_schema(&self, chat_id: &ChatId, tools: Vec<orch_core::ToolDefinition>) -> Result<()> {
        self.mutate_with_reload(chat_id, |ctx| {
            ctx.data.tools = if tools.is_empty() { None } else { Some(tools) };
        })
        .await?;
        Ok(())
    }

    /// A missing file is not an error.
    pub async fn clear(&self, chat_id: &ChatId) -> Result<()> {
        let mut cache = self.cache.lock().await;
        cache.remove(chat_id);
        drop(cache);

        let path = context_file_path(&self.config.history_dir, chat_id.as_str());
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ContextError::Io { chat_id: chat_id.to_string(), source: e }),
        }
    }

    pub async fn status(&self) -> ContextStoreStatus {
        let cache = self.cache.lock().await;
        ContextStoreStatus {
            cached_chats: cache.len(),
            dirty_chats: cache.values().filter(|e| e.dirty).count(),
        }
    }

    /// Flushes every dirty entry without evicting — used on graceful
    /// shutdown.
    pub async fn flush_all(&self) {
        let mut cache = self.cache.lock().await;
        let chat_ids: Vec<ChatId> = cache.keys().cloned().collect();
        for chat_id in chat_ids {
            self.flush_if_dirty(&chat_id, &mut cache).await;
        }
    }

    /// Every 60s, evicts cache entries idle for at least
    /// `cache_inactive_unload_seconds`, flushing first if dirty. Runs until
    /// `shutdown` is cancelled.
    pub async fn run_eviction_daemon(&self, shutdown: Shutdown) {
        let sweep_interval = Duration::from_secs(60);
        loop {
            tokio::select! {
                _ = tokio::time::sleep(sweep_interval) => {}
                _ = shutdown.cancelled() => {
                    self.flush_all().await;
                    return;
                }
            }

            let threshold = Duration::from_secs(self.config.cache_inactive_unload_seconds);
            let mut cache = self.cache.lock().await;
            let stale: Vec<ChatId> = cache
                .iter()
                .filter(|(_, entry)| entry.last_access.elapsed() >= threshold)
                .map(|(chat_id, _)| chat_id.clone())
                .collect();
            for chat_id in stale {
                self.flush_if_dirty(&chat_id, &mut cache).await;
                cache.remove(&chat_id);
                debug!(chat_id = %chat_id, "evicted inactive context from cache");
            }
        }
    }
}

/// Collapses list-shaped `user` content with no text part to a placeholder
/// string: a string passes through unchanged; a list with any
/// text part is kept as-is; an image-only list collapses to `[图片消息]` for
/// a single image or `[N张图片]` for more, and an empty list also collapses
/// to `[图片消息]` (matching `context_manager.py::_extract_message_content`).
fn reduce_user_content_for_storage(content: Content) -> Content {
    match &content {
        Content::Text(_) => content,
        Content::Parts(parts) => {
            if content.has_text_part() {
                return content;
            }
            if parts.is_empty() {
                return Content::text("[图片消息]");
            }
            let images = parts
                .iter()
                .filter(|p| matches!(p, MessagePart::ImageUrl { .. }))
                .count();
            let placeholder = match images {
                0 => "[消息]".to_string(),
                1 => "[图片消息]".to_string(),
                n => format!("[{}张图片]", n),
            };
            Content::text(placeholder)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orch_core::{config::ContextStoreConfig, NoTools};

    fn test_store(history_dir: &std::path::Path) -> ContextStore {
        let config = ContextStoreConfig {
            history_dir: history_dir.to_string_lossy().to_string(),
            max_user_messages_per_chat: 2,
            ..ContextStoreConfig::default()
        };
        ContextStore::new(config, Arc::new(NoTools))
    }

    #[tokio::test]
    async fn get_creates_default_context_with_system_first() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(dir.path());
        let chat_id = ChatId::from("c1");
        let ctx = store.get(&chat_id).await;
        assert_eq!(ctx.data.messages.len(), 1);
        assert_eq!(ctx.data.messages[0].role, Role::System);
    }

    #[tokio::test]
    async fn update_appends_and_trims() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(dir.path());
        let chat_id = ChatId::from("c1");

        store.update(&chat_id, Message::user(Content::text("A"))).await.unwrap();
        store.update(&chat_id, Message::assistant_text("a1")).await.unwrap();
        store.update(&chat_id, Message::user(Content::text("B"))).await.unwrap();
        store.update(&chat_id, Message::assistant_text("b1")).await.unwrap();
        store.update(&chat_id, Message::user(Content::text("C"))).await.unwrap();

        let ctx = store.get(&chat_id).await;
        assert_eq!(ctx.count_user_messages(), 2);
        let texts: Vec<_> = ctx.data.messages[1..].iter().filter_map(|m| m.text()).collect();
        assert_eq!(texts, vec!["B".to_string(), "b1".to_string(), "C".to_string()]);
    }

    #[tokio::test]
    async fn custom_prompt_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(dir.path());
        let chat_id = ChatId::from("c1");
        store.get(&chat_id).await;

        store.set_custom_prompt(&chat_id, "X".to_string()).await.unwrap();
        let (prompt, has_custom) = store.get_custom_prompt(&chat_id).await;
        assert_eq!(prompt, "X");
        assert!(has_custom);

        store.delete_custom_prompt(&chat_id).await.unwrap();
        let (prompt, has_custom) = store.get_custom_prompt(&chat_id).await;
        assert_eq!(prompt, "");
        assert!(!has_custom);
    }

    #[tokio::test]
    async fn clear_missing_file_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(dir.path());
        let chat_id = ChatId::from("never-created");
        assert!(store.clear(&chat_id).await.is_ok());
    }
}
