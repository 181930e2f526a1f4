use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

pub fn ensure_dir(path: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(path)
}

/// Cut `input` to at most `max_chars` characters without splitting a code point.
pub fn truncate_chars(input: &str, max_chars: usize) -> String {
    match input.char_indices().nth(max_chars) {
        Some((idx, _)) => input[..idx].to_string(),
        None => input.to_string(),
    }
}

/// Strip reply headers and collapse whitespace in quoted thread text.
pub fn clean_email_text(text: &str, max_chars: usize) -> String {
    static WROTE: OnceLock<Regex> = OnceLock::new();
    static HEADERS: OnceLock<Regex> = OnceLock::new();
    static SPACE: OnceLock<Regex> = OnceLock::new();

    let wrote = WROTE.get_or_init(|| Regex::new(r"On .* wrote:").expect("static regex"));
    let headers =
        HEADERS.get_or_init(|| Regex::new(r"(?s)From:.*?Subject:").expect("static regex"));
    let space = SPACE.get_or_init(|| Regex::new(r"\s+").expect("static regex"));

    let text = wrote.replace_all(text, "");
    let text = headers.replace_all(&text, "");
    let text = space.replace_all(&text, " ");
    truncate_chars(text.trim(), max_chars)
}

/// A stem plus a short alphanumeric extension, no path separators.
pub fn looks_like_file_name(candidate: &str) -> bool {
    static FILE_NAME: OnceLock<Regex> = OnceLock::new();
    let pattern = FILE_NAME
        .get_or_init(|| Regex::new(r"^[^/\\<>]+\.[A-Za-z0-9]{1,8}$").expect("static regex"));
    let trimmed = candidate.trim();
    !trimmed.is_empty() && trimmed.len() <= 255 && pattern.is_match(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncates_on_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }

    #[test]
    fn cleans_quoted_reply_text() {
        let raw = "On Mon, Jan 1, Ana wrote:\n  Please   send\n\nthe numbers.";
        assert_eq!(clean_email_text(raw, 2000), "Please send the numbers.");
    }

    #[test]
    fn cleaning_respects_length_limit() {
        let raw = "a".repeat(5000);
        assert_eq!(clean_email_text(&raw, 2000).chars().count(), 2000);
    }

    #[test]
    fn recognizes_file_names() {
        assert!(looks_like_file_name("report.pdf"));
        assert!(looks_like_file_name("Q3 numbers (final).xlsx"));
        assert!(!looks_like_file_name("Download"));
        assert!(!looks_like_file_name("folder/report.pdf"));
        assert!(!looks_like_file_name(""));
    }
}
