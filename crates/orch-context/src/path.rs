use regex::Regex;
use std::sync::OnceLock;

const MAX_FILENAME_LEN: usize = 200;

fn illegal_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"[<>:"/\\|?*]"#).unwrap())
}

/// Chat id with illegal path characters replaced by `_`, truncated to
/// [`MAX_FILENAME_LEN`] by keeping the first 150 characters and appending
/// the first 8 hex digits of the MD5 of the *original* (pre-truncation)
/// sanitized id, grounded on `context_manager.py::_get_context_file_path`.
pub fn safe_chat_id(chat_id: &str) -> String {
    let sanitized = illegal_chars().replace_all(chat_id, "_").into_owned();
    if sanitized.len() <= MAX_FILENAME_LEN {
        return sanitized;
    }
    let digest = md5::compute(sanitized.as_bytes());
    let hash_part = format!("{:x}", digest)[..8].to_string();
    format!("{}_{}", &sanitized[..150], hash_part)
}

pub fn context_file_path(history_dir: &str, chat_id: &str) -> std::path::PathBuf {
    std::path::Path::new(history_dir).join(format!("{}.json", safe_chat_id(chat_id)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_illegal_characters() {
        assert_eq!(safe_chat_id("telegram/123:456"), "telegram_123_456");
    }

    #[test]
    fn leaves_short_ids_unchanged() {
        assert_eq!(safe_chat_id("c1"), "c1");
    }

    #[test]
    fn truncates_and_hashes_long_ids() {
        let long_id = "x".repeat(250);
        let safe = safe_chat_id(&long_id);
        assert_eq!(safe.len(), 150 + 1 + 8);
        assert!(safe.starts_with(&"x".repeat(150)));
    }
}
