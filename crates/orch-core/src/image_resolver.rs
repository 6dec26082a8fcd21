use async_trait::async_trait;

use crate::types::ChatId;

/// External image fetcher/encoder facade (an
/// out-of-scope collaborator, "specified only by the interface the core
/// consumes"). The Session store calls this while reshaping a snapshot's
/// `image_url` parts: an `http(s)://` URL is looked up in the
/// fetcher's own cache; a `data:image/...` URL never reaches this trait
/// (the Session store passes those through directly).
///
/// Implemented by an adapter in `orch-ports` so `orch-sessions` never
/// depends on the HTTP stack directly.
#[async_trait]
pub trait ImageResolver: Send + Sync {
    /// Resolves `url` to an inline `data:image/...;base64,...` URI, or
    /// `None` if it cannot be resolved (not cached, fetch failed) — the
    /// Session store drops the image part in that case rather than erroring.
    async fn resolve(&self, chat_id: &ChatId, url: &str) -> Option<String>;
}

/// Resolver that never resolves anything — every HTTP(S) image URL is
/// dropped. Useful for text-only deployments and for tests that don't
/// exercise MLLM image handling.
pub struct NoImages;

#[async_trait]
impl ImageResolver for NoImages {
    async fn resolve(&self, _chat_id: &ChatId, _url: &str) -> Option<String> {
        None
    }
}
