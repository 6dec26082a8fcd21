use orch_core::ChatId;

/// Capability bag handed to every tool handler alongside its parsed
/// arguments, replacing dynamic kwargs injection ("add `chat_id`/
/// `session_id` to the call only if the handler declares it wants them")
/// with a plain struct: a tool opts in by declaring
/// `wants_chat_id`/`wants_session_id` on [`crate::registry::Tool`], and the
/// registry only populates the corresponding field here.
#[derive(Debug, Clone, Default)]
pub struct ToolCapabilities {
    pub chat_id: Option<ChatId>,
    pub session_id: Option<String>,
}
