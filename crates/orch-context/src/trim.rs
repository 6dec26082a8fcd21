use orch_core::{Message, Role};

/// Enforces invariants I2 (at most `max_user_messages` user messages) and I3
/// (trimming removes whole dialogue rounds, never leaving an orphan
/// assistant/tool message) on `messages[1..]` — `messages[0]` is always the
/// system message and is never touched.
///
/// Grounded on `context_manager.py::_trim_context_messages`: repeatedly
/// drop the oldest dialogue round — a `user` message together with the
/// contiguous run of `assistant`/`tool` messages that follow it — until the
/// user-message count is within bound. A message sequence that somehow
/// starts (right after the system message) with something other than a
/// `user` message is an orphan; it is dropped on its own with a warning
/// rather than folded into the next round.
pub fn trim_dialogue_rounds(messages: &mut Vec<Message>, max_user_messages: usize) {
    loop {
        let user_count = messages.iter().skip(1).filter(|m| m.role == Role::User).count();
        if user_count <= max_user_messages || messages.len() <= 1 {
            return;
        }

        if messages[1].role != Role::User {
            tracing::warn!(
                role = ?messages[1].role,
                "orphan message found while trimming dialogue history; dropping it"
            );
            messages.remove(1);
            continue;
        }

        let mut end = 2;
        while end < messages.len() && messages[end].role != Role::User {
            end += 1;
        }
        messages.drain(1..end);
    }
}
