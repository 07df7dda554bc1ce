//! Document summarization.

pub mod bedrock;

use crate::prelude::*;

/// Capability interface over a text-generation backend.
///
/// Implementations return at most `max_lines` non-empty, trimmed lines. Any
/// backend error, including a malformed response payload, must propagate as
/// an error.
#[async_trait]
pub trait Summarizer: Send + Sync + 'static {
    /// Summarize `full_text` into at most `max_lines` lines.
    async fn summarize(&self, full_text: &str, max_lines: usize) -> Result<Vec<String>>;
}

/// Split a model response into at most `max_lines` non-empty, trimmed lines.
/// Models asked for "exactly 3 lines" routinely return more, fewer, or extra
/// blank lines, so the bound is enforced here rather than trusted.
pub fn summary_lines(response: &str, max_lines: usize) -> Vec<String> {
    response
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .take(max_lines)
        .map(str::to_owned)
        .collect()
}

/// Truncate `text` to at most `max_chars` characters.
///
/// The generation backend has a token budget, so oversized documents are cut
/// before submission. Cutting at a fixed character count keeps the prompt,
/// and therefore the result, reproducible for identical input.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
