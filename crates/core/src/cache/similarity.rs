//! Change significance heuristics.
//!
//! A cheap length-delta check runs first, then a chunk-sampling similarity
//! estimate. False positives are fine; missing a large rewrite is not.

use super::snapshots::ChangeType;

/// Relative length change (percent) above which content counts as changed.
pub const LENGTH_DELTA_PERCENT: f64 = 5.0;

/// Chunk similarity below which content counts as changed.
pub const SIMILARITY_THRESHOLD: f64 = 0.95;

/// Chunk size, in characters, used by [`similarity`].
pub const CHUNK_SIZE: usize = 50;

/// Decide whether `next` differs enough from `previous` to store a new snapshot.
pub fn is_significant_change(previous: &str, next: &str, change_type: ChangeType) -> bool {
    if change_type == ChangeType::Navigation {
        return true;
    }

    let previous_len = previous.chars().count();
    let next_len = next.chars().count();
    let delta = previous_len.abs_diff(next_len) as f64 * 100.0 / previous_len.max(1) as f64;
    if delta > LENGTH_DELTA_PERCENT {
        return true;
    }

    similarity(previous, next) < SIMILARITY_THRESHOLD
}

/// Estimate how similar two texts are, from 0.0 to 1.0.
///
/// The shorter text is cut into non-overlapping [`CHUNK_SIZE`] character
/// chunks (the trailing partial chunk included). The score is the fraction of
/// those chunks that occur anywhere in the longer text.
pub fn similarity(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let (shorter, longer) = if a.chars().count() <= b.chars().count() { (a, b) } else { (b, a) };
    let chunks = chunks(shorter, CHUNK_SIZE);
    let matches = chunks.iter().filter(|chunk| longer.contains(*chunk)).count();
    matches as f64 / chunks.len() as f64
}

fn chunks(text: &str, size: usize) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    for (count, (idx, _)) in text.char_indices().enumerate() {
        if count > 0 && count % size == 0 {
            out.push(&text[start..idx]);
            start = idx;
        }
    }
    if start < text.len() {
        out.push(&text[start..]);
    }
    out
}
