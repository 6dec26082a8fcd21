use std::sync::OnceLock;

use regex::Regex;

use orch_ports::ChatResponse;

const EMPTY_RESPONSE: &str = "模型服务返回空响应";
const TOOL_STALL_APOLOGY: &str = "[抱歉，群聊太过抽象，响应失败啦]";

macro_rules! cached_regex {
    ($name:ident, $pattern:expr) => {
        fn $name() -> &'static Regex {
            static RE: OnceLock<Regex> = OnceLock::new();
            RE.get_or_init(|| Regex::new($pattern).unwrap())
        }
    };
}

cached_regex!(think_block, r"(?s)<think>.*?</think>");
cached_regex!(thinking_block, r"(?s)<\|thinking\|>.*?</\|thinking\|>");
cached_regex!(bracket_block, r"(?s)\[思考\].*?\[/思考\]");
cached_regex!(think_close, r"</think>");
cached_regex!(thinking_close, r"</\|thinking\|>");
cached_regex!(bracket_close, r"\[/思考\]");

/// Strips a `<think>…</think>`-style reasoning block from model output.
/// Tries every "remove" pattern first (a matched pair vanishes entirely);
/// failing that, tries every "after" pattern (keep only what follows a lone
/// closing tag); failing that, returns the text unchanged.
pub fn filter_thinking(text: &str) -> String {
    for pattern in [think_block(), thinking_block(), bracket_block()] {
        let cleaned = pattern.replace_all(text, "");
        if cleaned.len() < text.len() {
            return cleaned.trim().to_string();
        }
    }
    for pattern in [think_close(), thinking_close(), bracket_close()] {
        if let Some(m) = pattern.find(text) {
            let after = text[m.end()..].trim();
            if !after.is_empty() {
                return after.to_string();
            }
        }
    }
    text.trim().to_string()
}

/// Extracts the text that should be sent back to the chat from a model
/// response: prefer `message.content`, fall back to the fixed stall apology
/// when the model only emitted `tool_calls` with no text, and fall back to
/// a fixed "empty response" string when there is no response at all.
/// Grounded on `task_manager.py::_extract_response_content`.
pub fn extract_response_content(response: Option<&ChatResponse>) -> String {
    let Some(response) = response else {
        return EMPTY_RESPONSE.to_string();
    };

    match response.content.as_deref() {
        Some(text) if !text.is_empty() => filter_thinking(text),
        _ => {
            let has_tool_calls = response.tool_calls.as_ref().is_some_and(|calls| !calls.is_empty());
            if has_tool_calls {
                TOOL_STALL_APOLOGY.to_string()
            } else {
                EMPTY_RESPONSE.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orch_core::{ToolCallFunction, ToolCallRequest};

    #[test]
    fn empty_response_uses_fixed_string() {
        assert_eq!(extract_response_content(None), EMPTY_RESPONSE);
    }

    #[test]
    fn content_present_wins() {
        let r = ChatResponse { content: Some("hello".to_string()), tool_calls: None };
        assert_eq!(extract_response_content(Some(&r)), "hello");
    }

    #[test]
    fn tool_calls_without_content_use_apology() {
        let r = ChatResponse {
            content: None,
            tool_calls: Some(vec![ToolCallRequest {
                id: "1".to_string(),
                call_type: "function".to_string(),
                function: ToolCallFunction { name: "t".to_string(), arguments: "{}".to_string() },
            }]),
        };
        assert_eq!(extract_response_content(Some(&r)), TOOL_STALL_APOLOGY);
    }

    #[test]
    fn removes_complete_think_block() {
        let text = "<think>reasoning here</think>the actual answer";
        assert_eq!(filter_thinking(text), "the actual answer");
    }

    #[test]
    fn keeps_text_after_lone_closing_tag() {
        let text = "some stray reasoning</think>the actual answer";
        assert_eq!(filter_thinking(text), "the actual answer");
    }

    #[test]
    fn unmatched_text_passes_through() {
        let text = "plain answer, no think tags";
        assert_eq!(filter_thinking(text), text);
    }

    #[test]
    fn bracket_style_block_is_removed() {
        let text = "[思考]internal[/思考]visible answer";
        assert_eq!(filter_thinking(text), "visible answer");
    }
}
