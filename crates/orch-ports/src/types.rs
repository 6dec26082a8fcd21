use orch_core::{ChatId, Content, Message, ToolCallRequest, ToolDefinition};
use serde::{Deserialize, Serialize};

/// Wire shape a frontend adapter hands to its registered message callback
/// sent by a frontend, which the agent core forwards verbatim
/// into `QueueManager::enqueue_message`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundFrame {
    pub chat_id: ChatId,
    pub content: Content,
    pub is_respond: bool,
    pub timestamp: f64,
}

/// A completed workflow-C response, fanned out to every connected frontend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundFrame {
    pub chat_id: ChatId,
    pub content: String,
    pub timestamp: f64,
}

/// Runtime connection state of a frontend or model adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortStatus {
    Connected,
    Connecting,
    Disconnected,
    Error(String),
}

/// Request shape handed to a [`crate::model::ModelAdapter`], built from a
/// session's reshaped `data` block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub max_tokens: u32,
    pub temperature: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDefinition>>,
}

/// The model backend's reply: either plain text or a batch of tool calls
/// (never both, per the OpenAI chat-completions shape this system targets).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallRequest>>,
}
