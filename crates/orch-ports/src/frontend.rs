use async_trait::async_trait;

use crate::error::PortError;
use crate::types::{InboundFrame, OutboundFrame, PortStatus};

/// A callback a frontend adapter invokes for every inbound frame it
/// receives, wired by the agent core to `QueueManager::enqueue_message`.
#[async_trait]
pub trait InboundSink: Send + Sync {
    async fn on_message(&self, frame: InboundFrame);
}

/// Common interface implemented by every chat frontend adapter (a
/// WebSocket bridge, an IM bot, a web chat widget, …).
///
/// Implementations must be `Send + Sync` so they can be stored in a
/// [`crate::manager::PortManager`] and driven from multiple Tokio tasks.
#[async_trait]
pub trait Frontend: Send + Sync {
    /// Stable lowercase identifier for this adapter (e.g. `"websocket"`).
    fn name(&self) -> &str;

    /// Establish the connection (or begin listening) and start delivering
    /// inbound frames to `sink`.
    async fn start(&self, sink: std::sync::Arc<dyn InboundSink>) -> Result<(), PortError>;

    /// Gracefully stop delivering frames and release resources.
    async fn stop(&self) -> Result<(), PortError>;

    /// Deliver a single outbound response to its destination chat.
    async fn send(&self, frame: &OutboundFrame) -> Result<(), PortError>;

    /// Return the current runtime status without blocking.
    async fn status(&self) -> PortStatus;
}
