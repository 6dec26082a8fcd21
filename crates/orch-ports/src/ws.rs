use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::PortError;
use crate::frontend::{Frontend, InboundSink};
use crate::types::{InboundFrame, OutboundFrame, PortStatus};

/// A single connected WebSocket client, registered by `orch-agent`'s Axum
/// handler for the lifetime of the socket.
pub type ConnectionId = Uuid;

/// Frontend adapter for the fixed `{chat_id, content, is_respond,
/// timestamp}` WebSocket wire frame. Holds no socket itself —
/// `orch-agent`'s Axum `/ws` route owns the actual `WebSocket`, registering
/// a sender here on connect and forwarding received text via
/// [`WsFrontend::handle_inbound_text`].
pub struct WsFrontend {
    connections: DashMap<ConnectionId, mpsc::UnboundedSender<String>>,
    sink: RwLock<Option<Arc<dyn InboundSink>>>,
    status: RwLock<PortStatus>,
}

impl WsFrontend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            connections: DashMap::new(),
            sink: RwLock::new(None),
            status: RwLock::new(PortStatus::Disconnected),
        })
    }

    /// Registers a newly accepted socket, returning the receiving half the
    /// Axum task should forward to the client.
    pub fn register_connection(&self) -> (ConnectionId, mpsc::UnboundedReceiver<String>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.connections.insert(id, tx);
        debug!(conn_id = %id, "websocket connection registered");
        (id, rx)
    }

    pub fn unregister_connection(&self, id: ConnectionId) {
        self.connections.remove(&id);
        debug!(conn_id = %id, "websocket connection unregistered");
    }

    /// Parses one inbound text frame and forwards it to the registered
    /// sink. Malformed frames are logged and dropped rather than closing
    /// the connection.
    pub async fn handle_inbound_text(&self, text: &str) {
        let frame: InboundFrame = match serde_json::from_str(text) {
            Ok(f) => f,
            Err(e) => {
                warn!(error = %e, "dropping malformed inbound frame");
                return;
            }
        };
        if let Some(sink) = self.sink.read().await.as_ref() {
            sink.on_message(frame).await;
        }
    }
}

#[async_trait::async_trait]
impl Frontend for WsFrontend {
    fn name(&self) -> &str {
        "websocket"
    }

    async fn start(&self, sink: Arc<dyn InboundSink>) -> Result<(), PortError> {
        *self.sink.write().await = Some(sink);
        *self.status.write().await = PortStatus::Connected;
        Ok(())
    }

    async fn stop(&self) -> Result<(), PortError> {
        self.connections.clear();
        *self.status.write().await = PortStatus::Disconnected;
        Ok(())
    }

    async fn send(&self, frame: &OutboundFrame) -> Result<(), PortError> {
        let payload = serde_json::to_string(frame).map_err(|e| PortError::SendFailed(e.to_string()))?;
        let mut dead = Vec::new();
        for entry in self.connections.iter() {
            if entry.value().send(payload.clone()).is_err() {
                dead.push(*entry.key());
            }
        }
        for id in dead {
            self.connections.remove(&id);
        }
        Ok(())
    }

    async fn status(&self) -> PortStatus {
        self.status.read().await.clone()
    }
}
