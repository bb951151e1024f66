//! Iterative compression loop
//!
//! Each iteration chunks the current document, compresses every chunk with a
//! proportional word target, joins the results with `"\n"` and re-counts.
//! The loop stops once the document fits the target or the iteration cap is
//! reached. Aggression grows after every iteration so that overshooting
//! compressors are pushed harder on the next pass.

use rayon::prelude::*;
use serde::Serialize;

use crate::budget::target_word_count;
use crate::chunking::{Chunk, TokenChunker};
use crate::compressor::{ChunkCompressor, CompressionRequest};
use crate::config::Settings;
use crate::error::{CondenseError, Result};
use crate::prompts::Style;
use crate::tokenizer::TokenCounter;

/// Separator placed between compressed chunks
pub const CHUNK_SEPARATOR: &str = "\n";

/// Loop parameters
#[derive(Debug, Clone, PartialEq)]
pub struct LoopConfig {
    /// Token count the document must reach
    pub target_tokens: usize,
    /// Largest chunk handed to the compressor
    pub max_chunk_tokens: usize,
    /// Iteration cap
    pub max_iterations: u32,
    /// Aggression on the first iteration
    pub initial_aggression: f64,
    /// Aggression multiplier per iteration
    pub aggression_growth: f64,
    /// Prompt style
    pub style: Style,
    /// Ask for JSON output
    pub json: bool,
    /// Compress the chunks of an iteration concurrently
    pub parallel: bool,
}

impl LoopConfig {
    /// Defaults: 100 iterations, aggression 1.2 growing by 1.1, summary style
    pub fn new(target_tokens: usize, max_chunk_tokens: usize) -> Self {
        Self::from_settings(&Settings::default(), target_tokens, max_chunk_tokens)
    }

    /// Take the loop knobs from loaded settings
    pub fn from_settings(settings: &Settings, target_tokens: usize, max_chunk_tokens: usize) -> Self {
        Self {
            target_tokens,
            max_chunk_tokens,
            max_iterations: settings.max_iterations,
            initial_aggression: settings.initial_aggression,
            aggression_growth: settings.aggression_growth,
            style: Style::default(),
            json: false,
            parallel: settings.parallel,
        }
    }

    pub fn with_style(mut self, style: Style) -> Self {
        self.style = style;
        self
    }

    pub fn with_json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }
}

/// Where a session stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopState {
    /// Over target, iterations left
    Running,
    /// At or under target
    Converged,
    /// Iteration cap reached while still over target
    Exhausted,
}

/// Snapshot of the loop between iterations. Each step produces a new one.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    /// Current document
    pub document: String,
    /// Token count of `document`
    pub tokens: usize,
    /// Iterations completed
    pub iteration: u32,
    /// Aggression for the next iteration
    pub aggression: f64,
}

impl Session {
    /// Session for an input document, before any iteration
    pub fn initial<T: TokenCounter + ?Sized>(counter: &T, document: &str, aggression: f64) -> Self {
        Self {
            document: document.to_owned(),
            tokens: counter.count(document),
            iteration: 0,
            aggression,
        }
    }

    /// Classify this session against the loop parameters
    pub fn state(&self, config: &LoopConfig) -> LoopState {
        if self.tokens <= config.target_tokens {
            LoopState::Converged
        } else if self.iteration >= config.max_iterations {
            LoopState::Exhausted
        } else {
            LoopState::Running
        }
    }

    /// The session that follows this one
    pub fn advance(self, document: String, tokens: usize, growth: f64) -> Self {
        Self {
            document,
            tokens,
            iteration: self.iteration + 1,
            aggression: self.aggression * growth,
        }
    }
}

/// Result of a finished run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompressionOutcome {
    /// Final document
    pub text: String,
    /// Final token count
    pub tokens: usize,
    /// Iterations performed
    pub iterations: u32,
    /// Converged or exhausted
    pub state: LoopState,
    /// Token count before the first iteration and after each one
    pub history: Vec<usize>,
}

impl CompressionOutcome {
    pub fn converged(&self) -> bool {
        self.state == LoopState::Converged
    }
}

/// Run the loop to completion
pub fn run<T, C>(config: &LoopConfig, counter: &T, compressor: &C, text: &str) -> Result<CompressionOutcome>
where
    T: TokenCounter + ?Sized,
    C: ChunkCompressor + ?Sized,
{
    run_observed(config, counter, compressor, text, |_| {})
}

/// Run the loop, calling `observer` with the initial session and after every
/// iteration
pub fn run_observed<T, C, O>(
    config: &LoopConfig,
    counter: &T,
    compressor: &C,
    text: &str,
    mut observer: O,
) -> Result<CompressionOutcome>
where
    T: TokenCounter + ?Sized,
    C: ChunkCompressor + ?Sized,
    O: FnMut(&Session),
{
    if config.target_tokens == 0 {
        return Err(CondenseError::InvalidTarget);
    }

    let chunker = TokenChunker::new(config.max_chunk_tokens);
    let mut session = Session::initial(counter, text, config.initial_aggression);
    let mut history = vec![session.tokens];
    observer(&session);

    loop {
        let state = session.state(config);
        if state != LoopState::Running {
            if state == LoopState::Exhausted {
                log::warn!(
                    "Maximum iterations ({}) reached; {} tokens remain against a target of {}",
                    config.max_iterations,
                    session.tokens,
                    config.target_tokens
                );
            }
            return Ok(CompressionOutcome {
                text: session.document,
                tokens: session.tokens,
                iterations: session.iteration,
                state,
                history,
            });
        }

        log::info!(
            "Iteration {}: {} tokens, target {}, aggression {:.3}",
            session.iteration + 1,
            session.tokens,
            config.target_tokens,
            session.aggression
        );

        let chunks: Vec<Chunk> = chunker.plan(counter, &session.document).iter().collect();
        let requests = build_requests(config, chunks, session.aggression);
        let document = compress_all(compressor, &requests, config.parallel).join(CHUNK_SEPARATOR);
        let tokens = counter.count(&document);

        session = session.advance(document, tokens, config.aggression_growth);
        history.push(tokens);
        observer(&session);
    }
}

fn build_requests(config: &LoopConfig, chunks: Vec<Chunk>, aggression: f64) -> Vec<CompressionRequest> {
    let total: usize = chunks.iter().map(|c| c.tokens).sum();
    log::debug!("{} chunks, {} tokens", chunks.len(), total);

    chunks
        .into_iter()
        .map(|chunk| CompressionRequest {
            index: chunk.index,
            target_words: target_word_count(chunk.tokens, total, config.target_tokens, aggression),
            chunk: chunk.text,
            style: config.style,
            json: config.json,
        })
        .collect()
}

/// Outputs come back in chunk order in both modes
fn compress_all<C: ChunkCompressor + ?Sized>(
    compressor: &C,
    requests: &[CompressionRequest],
    parallel: bool,
) -> Vec<String> {
    if parallel {
        requests.par_iter().map(|r| compressor.compress(r)).collect()
    } else {
        requests.iter().map(|r| compressor.compress(r)).collect()
    }
}
