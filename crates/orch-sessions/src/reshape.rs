use std::sync::Arc;

use orch_context::{ChatContext, ChatData};
use orch_core::{ChatMode, Content, ImageResolver, Message, MessagePart, Role};

const ATTENTION_HEAD: &str = "当前请求：\n";
const ATTENTION_TAIL: &str =
    "\n\n注意：以上是当前需要处理的具体问题，请优先关注并回应当前请求。历史对话仅作为背景信息参考。";

fn is_wrapped(text: &str) -> bool {
    text.starts_with(ATTENTION_HEAD)
}

fn wrap_attention(text: &str) -> String {
    if is_wrapped(text) {
        return text.to_string();
    }
    format!("{}{}{}", ATTENTION_HEAD, text, ATTENTION_TAIL)
}

/// Strips the attention prefix if present, reconstructing the original
/// text. Grounded on `session_manager.py`'s strip logic: it locates the
/// `"\n\n注意："` marker and takes everything between the head and that
/// marker as the original content.
fn strip_attention(text: &str) -> String {
    if let Some(inner) = text.strip_prefix(ATTENTION_HEAD) {
        if let Some(marker_idx) = inner.find("\n\n注意：") {
            return inner[..marker_idx].to_string();
        }
    }
    text.to_string()
}

/// Applies the wrap/strip rule to a single user message's content, given
/// whether this is the current (most recent, not-yet-answered) turn.
fn apply_attention(content: Content, is_current_turn: bool) -> Content {
    match content {
        Content::Text(text) => {
            let text = if is_current_turn { wrap_attention(&text) } else { strip_attention(&text) };
            Content::Text(text)
        }
        Content::Parts(mut parts) => {
            for part in parts.iter_mut() {
                if let MessagePart::Text { text } = part {
                    *text = if is_current_turn { wrap_attention(text) } else { strip_attention(text) };
                }
            }
            Content::Parts(parts)
        }
    }
}

/// Reduces a user message's content for LLM mode (text only, images
/// dropped) or resolves image URLs for MLLM mode.
async fn reduce_for_mode(content: Content, chat_mode: ChatMode, chat_id: &orch_core::ChatId, images: &dyn ImageResolver) -> Content {
    match (content, chat_mode) {
        (Content::Parts(parts), ChatMode::Llm) => Content::Text(
            parts
                .into_iter()
                .filter_map(|p| match p {
                    MessagePart::Text { text } => Some(text),
                    MessagePart::ImageUrl { .. } => None,
                })
                .collect::<Vec<_>>()
                .join(""),
        ),
        (Content::Parts(parts), ChatMode::Mllm) => {
            let mut resolved = Vec::with_capacity(parts.len());
            for part in parts {
                match part {
                    MessagePart::Text { text } => resolved.push(MessagePart::Text { text }),
                    MessagePart::ImageUrl { image_url } => {
                        if image_url.url.starts_with("data:image/") {
                            resolved.push(MessagePart::ImageUrl { image_url });
                        } else if image_url.url.starts_with("http://") || image_url.url.starts_with("https://") {
                            if let Some(data_uri) = images.resolve(chat_id, &image_url.url).await {
                                resolved.push(MessagePart::image(data_uri));
                            }
                            // unresolved: dropped.
                        }
                        // non-http, non-data URLs are dropped too.
                    }
                }
            }
            Content::Parts(resolved)
        }
        (text @ Content::Text(_), _) => text,
    }
}

/// Builds the reshaped `data` block a fresh session starts from. Grounded
/// on `session_manager.py::_filter_and_reorganize_context` and
/// `_process_images_in_messages`/`_handle_image_url`.
pub async fn reshape_snapshot(context: &ChatContext, images: Arc<dyn ImageResolver>) -> ChatData {
    let messages = context.data.messages.clone();
    let last_user_index = messages.iter().rposition(|m| m.role == Role::User);

    let mut reshaped = Vec::with_capacity(messages.len());
    for (i, mut message) in messages.into_iter().enumerate() {
        if message.role != Role::User {
            reshaped.push(message);
            continue;
        }

        let is_current_turn = last_user_index == Some(i);
        let content = message.content.take().unwrap_or_else(|| Content::text(""));
        let content = reduce_for_mode(content, context.chat_mode, &context.chat_id, images.as_ref()).await;
        let content = apply_attention(content, is_current_turn);
        message.content = Some(content);
        reshaped.push(message);
    }

    ChatData {
        model: context.data.model.clone(),
        messages: reshaped,
        max_tokens: context.data.max_tokens,
        temperature: context.data.temperature,
        stream: context.data.stream,
        tools: if context.tools_call { context.data.tools.clone() } else { None },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orch_core::{ChatId, NoImages};

    fn ctx(mode: ChatMode, messages: Vec<Message>) -> ChatContext {
        ChatContext {
            chat_id: ChatId::from("c1"),
            chat_mode: mode,
            tools_call: false,
            data: ChatData {
                model: "m".to_string(),
                messages,
                max_tokens: 10,
                temperature: 0.5,
                stream: false,
                tools: None,
            },
        }
    }

    #[tokio::test]
    async fn wraps_only_the_last_user_message() {
        let messages = vec![
            Message::system("core"),
            Message::user(Content::text("first")),
            Message::assistant_text("reply"),
            Message::user(Content::text("second")),
        ];
        let data = reshape_snapshot(&ctx(ChatMode::Llm, messages), Arc::new(NoImages)).await;
        assert_eq!(data.messages[1].text().unwrap(), "first");
        assert!(data.messages[3].text().unwrap().starts_with(ATTENTION_HEAD));
        assert!(data.messages[3].text().unwrap().contains("second"));
    }

    #[tokio::test]
    async fn llm_mode_drops_images_from_text() {
        let messages = vec![
            Message::system("core"),
            Message::user(Content::Parts(vec![
                MessagePart::text("look at this"),
                MessagePart::image("https://example.com/a.png"),
            ])),
        ];
        let data = reshape_snapshot(&ctx(ChatMode::Llm, messages), Arc::new(NoImages)).await;
        let text = data.messages[1].text().unwrap();
        assert!(text.contains("look at this"));
        assert!(!text.contains("example.com"));
    }
}
