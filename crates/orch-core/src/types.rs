use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque string naming a conversation, e.g. `"telegram_-1001_5522"`.
///
/// Keys every per-chat structure in the context store, queue manager, and
/// session store. Never parsed for structure — treated as an arbitrary key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct ChatId(pub String);

impl ChatId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ChatId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ChatId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Which generation mode a chat's model family belongs to.
///
/// Chosen once at context creation from which model lists are non-empty in
/// config (`Llm` if any LLM models are configured, else `Mllm`); governs
/// whether the session snapshot keeps image parts (see `orch-sessions`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatMode {
    Llm,
    Mllm,
}

/// Which of the three workflows a dequeued task is routed through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkflowType {
    /// Non-responding ambient update.
    A,
    /// Prepare a model turn: update context, create a session.
    B,
    /// Run the model turn, including the tool loop.
    C,
}

impl fmt::Display for WorkflowType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkflowType::A => write!(f, "A"),
            WorkflowType::B => write!(f, "B"),
            WorkflowType::C => write!(f, "C"),
        }
    }
}

/// Speaking role of a `Message`, matching the OpenAI Chat Completions roles
/// this system's external interfaces are shaped around.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// One element of a multi-part message body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessagePart {
    Text { text: String },
    ImageUrl { image_url: ImageUrlRef },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageUrlRef {
    pub url: String,
}

impl MessagePart {
    pub fn text(s: impl Into<String>) -> Self {
        MessagePart::Text { text: s.into() }
    }

    pub fn image(url: impl Into<String>) -> Self {
        MessagePart::ImageUrl {
            image_url: ImageUrlRef { url: url.into() },
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            MessagePart::Text { text } => Some(text),
            MessagePart::ImageUrl { .. } => None,
        }
    }
}

/// A message body: either a plain string, or an ordered list of typed parts.
///
/// The frontend/model wire shapes both allow either form for `user` content;
/// the Context store and Session store each reduce this differently (see
/// context updates and session snapshot reshaping).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    Text(String),
    Parts(Vec<MessagePart>),
}

impl Content {
    pub fn text(s: impl Into<String>) -> Self {
        Content::Text(s.into())
    }

    /// Concatenation of all text parts (or the plain string itself).
    pub fn joined_text(&self) -> String {
        match self {
            Content::Text(s) => s.clone(),
            Content::Parts(parts) => parts
                .iter()
                .filter_map(|p| p.as_text())
                .collect::<Vec<_>>()
                .join(""),
        }
    }

    pub fn has_text_part(&self) -> bool {
        match self {
            Content::Text(_) => true,
            Content::Parts(parts) => parts.iter().any(|p| p.as_text().is_some()),
        }
    }

    pub fn image_count(&self) -> usize {
        match self {
            Content::Text(_) => 0,
            Content::Parts(parts) => parts
                .iter()
                .filter(|p| matches!(p, MessagePart::ImageUrl { .. }))
                .count(),
        }
    }
}

/// A model-requested function invocation, as carried on an `assistant`
/// message's `tool_calls` array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub id: String,
    #[serde(rename = "type", default = "function_type")]
    pub call_type: String,
    pub function: ToolCallFunction,
}

fn function_type() -> String {
    "function".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallFunction {
    pub name: String,
    /// JSON-encoded argument object, exactly as the model emitted it.
    pub arguments: String,
}

/// One entry of `Conversation context.messages` / a session's reshaped copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Content>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallRequest>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: Some(Content::Text(content.into())),
            tool_calls: None,
            tool_call_id: None,
            name: None,
        }
    }

    pub fn user(content: Content) -> Self {
        Self {
            role: Role::User,
            content: Some(content),
            tool_calls: None,
            tool_call_id: None,
            name: None,
        }
    }

    pub fn assistant_text(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: Some(Content::Text(content.into())),
            tool_calls: None,
            tool_call_id: None,
            name: None,
        }
    }

    pub fn assistant_tool_calls(tool_calls: Vec<ToolCallRequest>) -> Self {
        Self {
            role: Role::Assistant,
            content: None,
            tool_calls: Some(tool_calls),
            tool_call_id: None,
            name: None,
        }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: Some(Content::Text(content.into())),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.into()),
            name: Some(name.into()),
        }
    }

    pub fn text(&self) -> Option<String> {
        self.content.as_ref().map(|c| c.joined_text())
    }
}

/// Server-side JSON-Schema description of a tool, as handed to the model in
/// `messages_data.tools` and echoed into a freshly created context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Read-only capability the Context store uses to stamp a freshly created
/// chat with the tool schema active at creation time.
///
/// `orch-tools::ToolRegistry` implements this; kept in `orch-core` so
/// `orch-context` never depends on `orch-tools` — the dependency runs one
/// way, through this trait object.
pub trait ToolSchemaProvider: Send + Sync {
    fn current_schema(&self) -> Vec<ToolDefinition>;
}

/// A no-op provider for contexts created without tool support wired up yet
/// (e.g. standalone context-store tests).
pub struct NoTools;

impl ToolSchemaProvider for NoTools {
    fn current_schema(&self) -> Vec<ToolDefinition> {
        Vec::new()
    }
}

/// Breaks the real cycle between the Context store (which wants the active
/// tool schema when stamping a freshly created chat) and the Tool registry
/// (which wants a read-only facade into the Context store for tools like
/// `context_lookup`): `orch-agent`'s wiring constructs this handle first,
/// builds the Context store against it, builds the Tool registry against
/// the Context store, then calls [`ToolSchemaHandle::set`] once the
/// registry exists. Neither crate holds a reference to the other directly.
#[derive(Default)]
pub struct ToolSchemaHandle(std::sync::RwLock<Vec<ToolDefinition>>);

impl ToolSchemaHandle {
    pub fn new() -> Self {
        Self(std::sync::RwLock::new(Vec::new()))
    }

    pub fn set(&self, definitions: Vec<ToolDefinition>) {
        *self.0.write().expect("tool schema handle poisoned") = definitions;
    }
}

impl ToolSchemaProvider for ToolSchemaHandle {
    fn current_schema(&self) -> Vec<ToolDefinition> {
        self.0.read().expect("tool schema handle poisoned").clone()
    }
}
