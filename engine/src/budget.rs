//! Per-chunk word targets
//!
//! Chunk compressions cannot coordinate with each other, so each chunk gets a
//! proportional slice of the global token budget, shrunk by the aggression
//! factor to compensate for compressors that overshoot their word count.

/// Average tokens per English word
pub const TOKENS_PER_WORD: f64 = 1.3;

/// Smallest word target ever requested
pub const MIN_TARGET_WORDS: usize = 1;

/// Word count a chunk's compressed output should aim for.
///
/// `max(floor(((chunk / total) * target) / aggression / 1.3), 1)`.
/// A zero `total_tokens` counts as a zero share and a non-positive
/// `aggression` as a zero target, so both yield the minimum.
pub fn target_word_count(
    chunk_tokens: usize,
    total_tokens: usize,
    global_target: usize,
    aggression: f64,
) -> usize {
    let proportion = if total_tokens > 0 {
        chunk_tokens as f64 / total_tokens as f64
    } else {
        0.0
    };

    let target_tokens = if aggression > 0.0 {
        (proportion * global_target as f64) / aggression
    } else {
        0.0
    };

    let words = (target_tokens / TOKENS_PER_WORD).floor();
    if words.is_finite() && words >= MIN_TARGET_WORDS as f64 {
        words as usize
    } else {
        MIN_TARGET_WORDS
    }
}
