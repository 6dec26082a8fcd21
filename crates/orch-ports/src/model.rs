use async_trait::async_trait;

use crate::error::PortError;
use crate::types::{ChatRequest, ChatResponse, PortStatus};

/// Common interface implemented by every model-backend adapter.
#[async_trait]
pub trait ModelAdapter: Send + Sync {
    /// Stable identifier for this adapter (e.g. the configured model name).
    fn name(&self) -> &str;

    async fn start(&self) -> Result<(), PortError>;
    async fn stop(&self) -> Result<(), PortError>;

    /// Send one chat-completion request and await its reply.
    async fn send_request(&self, request: &ChatRequest) -> Result<ChatResponse, PortError>;

    async fn is_connected(&self) -> bool;
    async fn status(&self) -> PortStatus;

    /// Atomically reserves an in-flight request slot for dispatch.
    /// Default: unbounded concurrency.
    fn try_reserve(&self) -> bool {
        true
    }

    /// Releases a slot reserved by [`Self::try_reserve`].
    fn release(&self) {}
}
