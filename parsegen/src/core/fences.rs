//! Removal of markdown code fences from model responses.

use std::sync::LazyLock;

use regex::Regex;

static FENCED_BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```[^\n`]*\r?\n(.*?)```").expect("fenced block regex should be valid")
});

/// Return the program source contained in `response`.
///
/// If the response holds a fenced block, the body of the first block is returned.
/// A response that opens a fence but never closes it loses only the opening line.
/// Otherwise the trimmed response is returned unchanged. Non-empty output always
/// ends with a single newline.
pub fn strip_code_fences(response: &str) -> String {
    let trimmed = response.trim();
    let body = if let Some(caps) = FENCED_BLOCK_RE.captures(trimmed) {
        caps.get(1).map_or("", |m| m.as_str())
    } else if trimmed.starts_with("```") {
        trimmed.split_once('\n').map_or("", |(_, rest)| rest)
    } else {
        trimmed
    };

    let body = body.trim_matches(|c| c == '\n' || c == '\r').trim_end();
    if body.is_empty() {
        return String::new();
    }
    format!("{body}\n")
}
