/// Path and file-name helpers
pub mod path;
/// Backoff for rate-limited calls
pub mod retry;

pub use path::{
    dotted_extension, image_mime_for_path, newest_matching, normalize_user_input_path,
    sanitize_file_name, wildcard_match,
};
pub use retry::{seconds, with_retry, RetryPolicy};

/// Truncate `text` to at most `max_chars` characters on a char boundary
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("", 3), "");
    }
}
