//! Condense Engine - iterative LLM compression to a token budget
//!
//! This crate provides the core logic for shrinking documents and codebases
//! until they fit a token target, including:
//!
//! - BPE token counting (tiktoken encodings for OpenAI models)
//! - Token-window chunking that partitions a document exactly
//! - Proportional per-chunk word targets
//! - A convergence loop with growing aggression and an iteration cap
//! - A codebase summarizer driven by per-file call graphs
//! - A line-by-line code explainer
//! - Layered configuration and remote repository cloning
//!
//! # Example
//!
//! ```rust,ignore
//! use condense_engine::{convergence, LlmCompressor, LoopConfig, OpenAiClient, Settings, Tokenizer};
//!
//! let settings = Settings::load(None, ".".as_ref())?;
//! let tokenizer = Tokenizer::for_model(&settings.model);
//! let compressor = LlmCompressor::new(OpenAiClient::from_settings(&settings)?, &settings.model);
//! let config = LoopConfig::from_settings(&settings, 500, 3000);
//! let outcome = convergence::run(&config, &tokenizer, &compressor, &text)?;
//! ```

pub mod budget;
pub mod chunking;
pub mod compressor;
pub mod config;
pub mod convergence;
pub mod error;
pub mod explain;
pub mod llm;
pub mod prompts;
pub mod remote;
pub mod summarize;
pub mod tokenizer;

pub use budget::target_word_count;
pub use chunking::{Chunk, ChunkPlan, TokenChunker};
pub use compressor::{ChunkCompressor, CompressionRequest, LlmCompressor};
pub use config::{ConfigError, Settings};
pub use convergence::{CompressionOutcome, LoopConfig, LoopState, Session};
pub use error::{CondenseError, Result};
pub use explain::{explained_path, strip_markup, Explainer};
pub use llm::{Completer, LlmError, OpenAiClient};
pub use prompts::{Style, StyleKind};
pub use remote::{RemoteError, RemoteRepo};
pub use summarize::{CallGraph, CodebaseSummarizer, CodebaseSummary, SourceFile, SummaryFormat, SummaryOptions};
pub use tokenizer::{Encoding, ModelProfile, TokenCounter, Tokenizer};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
