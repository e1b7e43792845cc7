//! Truncation helpers for tool details and result previews.

/// Truncates `text` to at most `max_chars` characters, appending `...`
/// when anything was cut. Operates on char boundaries so multi-byte
/// content never panics a slice.
pub fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let kept: String = text.chars().take(max_chars).collect();
    format!("{kept}...")
}

/// One-line preview of a multi-line blob: newlines collapse to spaces,
/// then the result is truncated like [`truncate`].
pub fn preview(text: &str, max_chars: usize) -> String {
    let flat = text
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    truncate(&flat, max_chars)
}
