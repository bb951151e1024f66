//! Accurate token counting using actual BPE tokenizers
//!
//! This module provides exact token counts (and the encode/decode round trip
//! the chunk splitter needs) using tiktoken encodings, plus the per-model
//! context window table used to size chunks.

use std::ops::Range;
use std::sync::OnceLock;
use tiktoken_rs::{cl100k_base, o200k_base, CoreBPE};

/// A single token id
pub type Token = usize;

/// Context window assumed for models missing from the table
pub const DEFAULT_CONTEXT_WINDOW: usize = 4096;

/// Tokens held back from the context window to avoid length errors
pub const DEFAULT_SAFETY_MARGIN: usize = 1000;

/// Something that can turn text into tokens and back.
///
/// The same counter must be used for chunking and for the convergence test.
pub trait TokenCounter {
    /// Encode text into tokens
    fn encode(&self, text: &str) -> Vec<Token>;

    /// Decode tokens back into text. Returns `None` when the tokens do not
    /// form valid UTF-8 (e.g. a window that splits a multi-byte character).
    fn decode(&self, tokens: &[Token]) -> Option<String>;

    /// Count tokens in text
    fn count(&self, text: &str) -> usize {
        self.encode(text).len()
    }

    /// Decode the token index range `range` of `text`.
    ///
    /// Out-of-bounds ends are clamped. A bound that falls inside a multi-byte
    /// character moves to the nearest character boundary within the range:
    /// the start forward, the end back.
    fn split_range(&self, text: &str, range: Range<usize>) -> String {
        let tokens = self.encode(text);
        let end = range.end.min(tokens.len());
        let start = range.start.min(end);

        // a prefix of a valid document decodes iff it ends on a character boundary
        let on_boundary = |cut: usize| self.decode(&tokens[..cut]).is_some();
        let from = (start..=end).find(|&cut| on_boundary(cut)).unwrap_or(end);
        let to = (from..=end).rev().find(|&cut| on_boundary(cut)).unwrap_or(from);
        self.decode(&tokens[from..to]).unwrap_or_default()
    }
}

/// Supported BPE encodings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Encoding {
    /// GPT-4o / o-series encoding
    O200kBase,
    /// GPT-4 / GPT-3.5 encoding (also the fallback)
    Cl100kBase,
}

impl Encoding {
    /// Select the encoding for a model identifier.
    ///
    /// Unrecognized identifiers fall back to `cl100k_base` instead of failing.
    pub fn for_model(model: &str) -> Self {
        let model = model.trim().to_lowercase();
        let o200k_prefixes = ["gpt-4o", "gpt-4.1", "chatgpt-4o", "o1", "o3", "o4"];
        let cl100k_prefixes = ["gpt-4", "gpt-3.5", "text-embedding-3", "text-embedding-ada"];

        if o200k_prefixes.iter().any(|p| model.starts_with(p)) {
            Self::O200kBase
        } else if cl100k_prefixes.iter().any(|p| model.starts_with(p)) {
            Self::Cl100kBase
        } else {
            log::debug!("Unknown model '{}', falling back to cl100k_base", model);
            Self::Cl100kBase
        }
    }

    /// Get encoding name as tiktoken spells it
    pub fn name(&self) -> &'static str {
        match self {
            Self::O200kBase => "o200k_base",
            Self::Cl100kBase => "cl100k_base",
        }
    }

    fn bpe(&self) -> &'static CoreBPE {
        match self {
            Self::O200kBase => get_o200k_tokenizer(),
            Self::Cl100kBase => get_cl100k_tokenizer(),
        }
    }
}

/// Global tokenizer instances (lazy initialized, thread-safe)
static O200K_TOKENIZER: OnceLock<CoreBPE> = OnceLock::new();
static CL100K_TOKENIZER: OnceLock<CoreBPE> = OnceLock::new();

// BPE ranks are embedded in tiktoken-rs; construction only fails on a corrupt build.
fn get_o200k_tokenizer() -> &'static CoreBPE {
    O200K_TOKENIZER.get_or_init(|| o200k_base().expect("Failed to initialize o200k_base tokenizer"))
}

fn get_cl100k_tokenizer() -> &'static CoreBPE {
    CL100K_TOKENIZER
        .get_or_init(|| cl100k_base().expect("Failed to initialize cl100k_base tokenizer"))
}

/// Exact BPE token counter bound to one encoding
#[derive(Debug, Clone, Copy)]
pub struct Tokenizer {
    encoding: Encoding,
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self::new(Encoding::Cl100kBase)
    }
}

impl Tokenizer {
    /// Create a tokenizer for a specific encoding
    pub fn new(encoding: Encoding) -> Self {
        Self { encoding }
    }

    /// Create a tokenizer for a model identifier
    pub fn for_model(model: &str) -> Self {
        Self::new(Encoding::for_model(model))
    }

    /// Encoding in use
    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// Check if text exceeds a token budget
    pub fn exceeds_budget(&self, text: &str, budget: usize) -> bool {
        self.count(text) > budget
    }
}

impl TokenCounter for Tokenizer {
    fn encode(&self, text: &str) -> Vec<Token> {
        if text.is_empty() {
            return Vec::new();
        }
        self.encoding.bpe().encode_ordinary(text)
    }

    fn decode(&self, tokens: &[Token]) -> Option<String> {
        if tokens.is_empty() {
            return Some(String::new());
        }
        self.encoding.bpe().decode(tokens.to_vec()).ok()
    }
}

/// Per-model limits used to size chunks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelProfile {
    /// Maximum tokens a single request may hold (prompt + chunk)
    pub context_window: usize,
    /// Whether the model was found in the table
    pub known: bool,
}

impl ModelProfile {
    /// Look up a model's context window, falling back to a conservative default
    pub fn for_model(model: &str) -> Self {
        let context_window = match model.trim() {
            "gpt-4o" | "gpt-4o-mini" | "gpt-4-turbo" | "o1-preview" | "o1-mini" => Some(128_000),
            "gpt-4" => Some(8192),
            "gpt-3.5-turbo" => Some(16_385),
            "gpt-3.5-turbo-instruct" => Some(4096),
            _ => None,
        };

        match context_window {
            Some(context_window) => Self { context_window, known: true },
            None => {
                log::debug!(
                    "No context window known for '{}', assuming {}",
                    model,
                    DEFAULT_CONTEXT_WINDOW
                );
                Self { context_window: DEFAULT_CONTEXT_WINDOW, known: false }
            },
        }
    }

    /// Tokens left for a chunk once the safety margin and prompt are reserved.
    /// Never below 1.
    pub fn max_chunk_tokens(&self, safety_margin: usize, reserved_prompt_tokens: usize) -> usize {
        self.context_window
            .saturating_sub(safety_margin)
            .saturating_sub(reserved_prompt_tokens)
            .max(1)
    }
}
