//! Utility functions for input normalization.

use std::sync::OnceLock;

use regex_lite::Regex;

/// Upper bound on persisted error messages, in bytes.
pub const MAX_ERROR_LEN: usize = 800;

fn url_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"https?://\S+").expect("static regex is valid"))
}

/// Pull the first http(s) link out of free-form share text.
///
/// Share buttons on most platforms wrap the link in a sentence, so trailing
/// punctuation is trimmed from the match.
pub fn extract_url(input: &str) -> Option<String> {
    let found = url_regex().find(input.trim())?;
    let trimmed = found
        .as_str()
        .trim_end_matches(&['.', ',', ';', ':', '!', '?', ')', '"', '\''][..]);
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Truncate to at most `max` bytes on a char boundary, appending `...` when cut.
pub fn truncate_message(message: &str, max: usize) -> String {
    if max == 0 || message.len() <= max {
        return message.to_string();
    }
    let mut end = max;
    while !message.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &message[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_url_from_share_text() {
        let text = "7.43 复制打开抖音，看看【作品】 https://v.douyin.com/iRNBho6u/ 01/23 abc:/";
        assert_eq!(
            extract_url(text).as_deref(),
            Some("https://v.douyin.com/iRNBho6u/")
        );
    }

    #[test]
    fn test_extract_url_trims_punctuation() {
        assert_eq!(
            extract_url("see (https://b23.tv/abc).").as_deref(),
            Some("https://b23.tv/abc")
        );
        assert_eq!(
            extract_url("\"https://www.douyin.com/video/123\"").as_deref(),
            Some("https://www.douyin.com/video/123")
        );
    }

    #[test]
    fn test_extract_url_none() {
        assert!(extract_url("no link here").is_none());
        assert!(extract_url("ftp://example.com/file").is_none());
    }

    #[test]
    fn test_truncate_message() {
        assert_eq!(truncate_message("short", 800), "short");
        let long = "x".repeat(900);
        let cut = truncate_message(&long, 800);
        assert_eq!(cut.len(), 803);
        assert!(cut.ends_with("..."));
        // Multi-byte characters are never split.
        let cut = truncate_message("ééé", 3);
        assert_eq!(cut, "é...");
    }
}
