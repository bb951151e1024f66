//! Token-window chunking for LLM context windows
//!
//! A document's token stream is cut greedily, left to right, into windows of
//! at most `max_tokens`. Chunks partition the stream exactly: no overlap, no
//! gaps, original order. Boundaries ignore sentence or statement structure.

use crate::tokenizer::{Token, TokenCounter};
use serde::Serialize;
use std::ops::Range;

/// A contiguous token range of a document
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    /// Chunk index (0-based)
    pub index: usize,
    /// Token indices covered by this chunk
    pub range: Range<usize>,
    /// Token count for this chunk
    pub tokens: usize,
    /// Decoded chunk text
    pub text: String,
}

/// Splits documents into fixed-size token windows
#[derive(Debug, Clone, Copy)]
pub struct TokenChunker {
    /// Maximum tokens per chunk
    max_tokens: usize,
}

impl TokenChunker {
    /// Create a new chunker. A zero size is raised to 1.
    pub fn new(max_tokens: usize) -> Self {
        Self { max_tokens: max_tokens.max(1) }
    }

    /// Maximum tokens per chunk
    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    /// Encode a document once and return a plan that can be iterated lazily
    pub fn plan<'c, C: TokenCounter + ?Sized>(&self, counter: &'c C, text: &str) -> ChunkPlan<'c, C> {
        ChunkPlan {
            counter,
            tokens: counter.encode(text),
            max_tokens: self.max_tokens,
        }
    }

    /// Convenience: plan and collect in one go
    pub fn split<C: TokenCounter + ?Sized>(&self, counter: &C, text: &str) -> Vec<Chunk> {
        self.plan(counter, text).iter().collect()
    }
}

/// An encoded document ready to be chunked
pub struct ChunkPlan<'c, C: TokenCounter + ?Sized> {
    counter: &'c C,
    tokens: Vec<Token>,
    max_tokens: usize,
}

impl<'c, C: TokenCounter + ?Sized> ChunkPlan<'c, C> {
    /// Total tokens in the document
    pub fn total_tokens(&self) -> usize {
        self.tokens.len()
    }

    /// Iterate chunks from the start. Each call restarts the sequence.
    pub fn iter(&self) -> Chunks<'_, 'c, C> {
        Chunks { plan: self, start: 0, index: 0 }
    }

    /// Find the end of the window starting at `start`.
    ///
    /// Prefers the full window; if it does not decode (a multi-byte character
    /// straddles the boundary) the end walks back, then forward, until it does.
    fn window(&self, start: usize) -> (usize, String) {
        let len = self.tokens.len();
        let full = (start + self.max_tokens).min(len);

        let mut end = full;
        while end > start {
            if let Some(text) = self.counter.decode(&self.tokens[start..end]) {
                return (end, text);
            }
            end -= 1;
        }

        for end in full + 1..=len {
            if let Some(text) = self.counter.decode(&self.tokens[start..end]) {
                return (end, text);
            }
        }

        // Undecodable tail: keep the partition exact and emit it lossily.
        log::debug!("Chunk at token {} could not be decoded cleanly", start);
        (full, String::new())
    }
}

/// Lazy iterator over a [`ChunkPlan`]
pub struct Chunks<'p, 'c, C: TokenCounter + ?Sized> {
    plan: &'p ChunkPlan<'c, C>,
    start: usize,
    index: usize,
}

impl<C: TokenCounter + ?Sized> Iterator for Chunks<'_, '_, C> {
    type Item = Chunk;

    fn next(&mut self) -> Option<Self::Item> {
        if self.start >= self.plan.tokens.len() {
            return None;
        }

        let (end, text) = self.plan.window(self.start);
        let chunk = Chunk {
            index: self.index,
            range: self.start..end,
            tokens: end - self.start,
            text,
        };

        self.start = end;
        self.index += 1;
        Some(chunk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::{Encoding, Tokenizer};

    /// One token per char; decode never fails
    struct CharCounter;

    impl TokenCounter for CharCounter {
        fn encode(&self, text: &str) -> Vec<Token> {
            text.chars().map(|c| c as Token).collect()
        }

        fn decode(&self, tokens: &[Token]) -> Option<String> {
            tokens.iter().map(|t| char::from_u32(*t as u32)).collect()
        }
    }

    #[test]
    fn test_fixed_windows() {
        let chunks = TokenChunker::new(4).split(&CharCounter, "abcdefghij");

        let texts: Vec<_> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["abcd", "efgh", "ij"]);
        assert_eq!(chunks[2].range, 8..10);
        assert_eq!(chunks.iter().map(|c| c.index).collect::<Vec<_>>(), vec![0, 1, 2]);
    }

    #[test]
    fn test_small_document_is_one_chunk() {
        let chunks = TokenChunker::new(100).split(&CharCounter, "short text");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "short text");
        assert_eq!(chunks[0].tokens, 10);
    }

    #[test]
    fn test_empty_document_has_no_chunks() {
        assert!(TokenChunker::new(8).split(&CharCounter, "").is_empty());
    }

    #[test]
    fn test_plan_is_restartable() {
        let counter = CharCounter;
        let plan = TokenChunker::new(3).plan(&counter, "abcdefg");

        let first: Vec<_> = plan.iter().collect();
        let second: Vec<_> = plan.iter().collect();
        assert_eq!(first, second);
        assert_eq!(plan.iter().take(1).count(), 1);
    }

    #[test]
    fn test_zero_size_is_raised() {
        assert_eq!(TokenChunker::new(0).max_tokens(), 1);
    }

    #[test]
    fn test_bpe_partition_reconstructs_document() {
        let tokenizer = Tokenizer::new(Encoding::Cl100kBase);
        let text = "The quick brown fox jumps over the lazy dog. ".repeat(40)
            + "Ünïcödé strings — 日本語のテキスト 🎉🎉 end.";

        for size in [1, 3, 7, 64] {
            let chunks = TokenChunker::new(size).split(&tokenizer, &text);
            let rebuilt: String = chunks.iter().map(|c| c.text.as_str()).collect();
            assert_eq!(rebuilt, text, "size {size}");

            let summed: usize = chunks.iter().map(|c| c.tokens).sum();
            assert_eq!(summed, tokenizer.count(&text), "size {size}");

            for pair in chunks.windows(2) {
                assert_eq!(pair[0].range.end, pair[1].range.start);
            }
        }
    }

    #[test]
    fn test_bpe_chunks_respect_limit_on_ascii() {
        let tokenizer = Tokenizer::default();
        let text = "lorem ipsum dolor sit amet ".repeat(50);
        let chunks = TokenChunker::new(16).split(&tokenizer, &text);

        assert!(chunks.iter().all(|c| c.tokens <= 16));
        assert!(chunks.iter().rev().skip(1).all(|c| c.tokens == 16));
    }

    proptest::proptest! {
        #[test]
        fn prop_chunks_partition_tokens(text in "\\PC{0,200}", size in 1usize..20) {
            let counter = CharCounter;
            let chunks = TokenChunker::new(size).split(&counter, &text);

            let rebuilt: String = chunks.iter().map(|c| c.text.as_str()).collect();
            proptest::prop_assert_eq!(rebuilt, text.clone());

            let summed: usize = chunks.iter().map(|c| c.tokens).sum();
            proptest::prop_assert_eq!(summed, counter.count(&text));
            proptest::prop_assert!(chunks.iter().all(|c| c.tokens <= size && c.tokens > 0));
        }
    }
}
