//! Fence-aware message segmenter.
//!
//! Splits document text into pieces no longer than `max_length` characters.
//! Split points are searched backwards from the limit inside a bounded
//! lookback window, preferring (in order) a blank line, a line break, the end
//! of a sentence, and a word boundary. When the limit falls inside a fenced
//! code block the block is closed at the end of the piece and reopened, with
//! the same language tag, at the start of the next one.
//!
//! Lengths are counted in characters, not bytes; every split lands on a char
//! boundary.

use tracing::{debug, warn};

use crate::models::Chunk;

/// How far back from the limit a split point is searched for.
pub const LOOKBACK: usize = 500;

/// Smallest limit the segmenter honors; smaller values are raised to it so
/// that fence repair always makes progress.
const MIN_LENGTH: usize = 16;

const FENCE: &str = "```";
const CLOSE_FENCE: &str = "\n```";

/// Split `text` into an ordered sequence of pieces of at most `max_length`
/// characters.
///
/// Concatenating the pieces gives back `text`, modulo whitespace trimmed at
/// split points and the fence lines inserted to close and reopen code
/// blocks.
pub fn split(text: &str, max_length: usize) -> Vec<String> {
    let max_length = max_length.max(MIN_LENGTH);

    if char_len(text) <= max_length {
        return vec![text.to_string()];
    }

    let mut pieces = Vec::new();
    let mut remaining = text.to_string();

    while char_len(&remaining) > max_length {
        let (head, tail) = split_step(&remaining, max_length);
        pieces.push(head);
        remaining = tail;
    }

    if !remaining.is_empty() {
        pieces.push(remaining);
    }

    debug!(pieces = pieces.len(), max_length, "split content");
    pieces
}

/// Split a document body and number the pieces.
///
/// `total` is only known once the whole sequence exists, so numbering is a
/// second pass over the buffered pieces.
pub fn split_document(source_name: &str, text: &str, max_length: usize) -> Vec<Chunk> {
    let pieces = split(text, max_length);
    let total = pieces.len();

    pieces
        .into_iter()
        .enumerate()
        .map(|(i, content)| Chunk {
            content,
            index: i + 1,
            total,
            source_name: source_name.to_string(),
        })
        .collect()
}

/// Cut one piece off the front of `remaining`.
fn split_step(remaining: &str, max_length: usize) -> (String, String) {
    let limit = byte_index(remaining, max_length);

    if fence_count(&remaining[..limit]) % 2 == 1 {
        return split_inside_fence(remaining, limit, max_length);
    }

    let search_start = byte_index(remaining, max_length.saturating_sub(LOOKBACK));
    if let Some((head_end, tail_start)) = find_boundary(remaining, search_start, limit) {
        return (
            remaining[..head_end].trim_end().to_string(),
            remaining[tail_start..].trim_start().to_string(),
        );
    }

    warn!(max_length, "no split point in lookback window, hard cut");
    (
        remaining[..limit].to_string(),
        remaining[limit..].to_string(),
    )
}

/// The limit falls inside a code block: close it at a line break and reopen
/// it in the tail.
fn split_inside_fence(remaining: &str, limit: usize, max_length: usize) -> (String, String) {
    // The count up to `limit` is odd, so the last fence in the window opens
    // the block the limit sits in.
    let opener = remaining[..limit].rfind(FENCE).unwrap_or(0);
    let line_end = remaining[opener..].find('\n').map(|i| opener + i);
    let language = fence_language(
        &remaining[opener + FENCE.len()..line_end.unwrap_or(remaining.len())],
    );
    let reopen = reopen_fence(&language, max_length);

    let budget_chars = max_length - CLOSE_FENCE.len();
    let budget = byte_index(remaining, budget_chars);
    let search_start = byte_index(remaining, budget_chars.saturating_sub(LOOKBACK));

    if let Some(line_end) = line_end {
        let from = search_start.max(line_end + 1);
        if from < budget {
            if let Some(p) = remaining[from..budget].rfind('\n') {
                let pos = from + p;
                debug!(language = %language, "split inside code block");
                return (
                    format!("{}{}", remaining[..pos].trim_end(), CLOSE_FENCE),
                    format!("{}{}", reopen, &remaining[pos + 1..]),
                );
            }
        }
    }

    // No line break inside the block fits. Cut at the budget and repair the
    // fences, unless the opening fence line itself does not fit.
    let fence_line_fits = line_end.is_some_and(|end| end < budget);
    if opener > 0 && !fence_line_fits {
        warn!(max_length, "code fence straddles the limit, cutting before it");
        return (
            remaining[..opener].to_string(),
            remaining[opener..].to_string(),
        );
    }

    warn!(max_length, language = %language, "no line break in code block, hard cut");
    (
        format!("{}{}", &remaining[..budget], CLOSE_FENCE),
        format!("{}{}", reopen, &remaining[budget..]),
    )
}

/// Rightmost acceptable split point in `text[start..end]`, by priority.
///
/// Returns `(head_end, tail_start)` byte offsets. Candidates that would
/// leave an empty head, or that sit inside a code block, are skipped.
fn find_boundary(text: &str, start: usize, end: usize) -> Option<(usize, usize)> {
    if start >= end {
        return None;
    }
    let window = &text[start..end];
    let accept = |head_end: usize, at: usize| {
        !text[..head_end].trim_end().is_empty() && fence_count(&text[..at]) % 2 == 0
    };

    for (p, _) in window.rmatch_indices("\n\n") {
        let p = start + p;
        if accept(p, p) {
            return Some((p + 2, p + 2));
        }
    }

    for (p, _) in window.rmatch_indices('\n') {
        let p = start + p;
        if accept(p, p) {
            return Some((p + 1, p + 1));
        }
    }

    for (p, _) in window.rmatch_indices(|c: char| matches!(c, '.' | '!' | '?')) {
        let p = start + p;
        if text[p + 1..end].starts_with(' ') && accept(p + 1, p) {
            return Some((p + 2, p + 2));
        }
    }

    for (p, _) in window.rmatch_indices(' ') {
        let p = start + p;
        if accept(p, p) {
            return Some((p, p + 1));
        }
    }

    None
}

/// First token after the fence marker (` ```rust title="x" ` → `rust`).
fn fence_language(line: &str) -> String {
    line.split_whitespace().next().unwrap_or("").to_string()
}

fn reopen_fence(language: &str, max_length: usize) -> String {
    let fence = format!("{}{}\n", FENCE, language);
    if char_len(&fence) * 2 >= max_length {
        format!("{}\n", FENCE)
    } else {
        fence
    }
}

fn fence_count(text: &str) -> usize {
    text.matches(FENCE).count()
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Byte offset of the `chars`-th character, or `text.len()` when shorter.
fn byte_index(text: &str, chars: usize) -> usize {
    text.char_indices()
        .nth(chars)
        .map(|(i, _)| i)
        .unwrap_or(text.len())
}
