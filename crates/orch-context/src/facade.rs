use async_trait::async_trait;
use orch_core::ChatId;

use crate::manager::ContextStore;
use crate::types::ChatContext;

/// Read-only view of the Context store, handed to the Tool registry so a
/// tool handler may look up a chat's state without gaining access to the
/// full mutating API. Breaks the context↔tools cycle with a one-way
/// dependency: `orch-tools` depends on this trait (and on `orch-context`
/// generally), `orch-context` never depends on `orch-tools`.
#[async_trait]
pub trait ContextFacade: Send + Sync {
    async fn snapshot(&self, chat_id: &ChatId) -> ChatContext;
}

#[async_trait]
impl ContextFacade for ContextStore {
    async fn snapshot(&self, chat_id: &ChatId) -> ChatContext {
        self.get(chat_id).await
    }
}
