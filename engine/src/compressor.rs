//! Per-chunk compression
//!
//! A failed call never aborts a run: the chunk contributes an empty string
//! to the next document and the failure is logged. Chunks are never retried.

use crate::llm::Completer;
use crate::prompts::{Style, TEXT_SYSTEM_PROMPT};

/// One chunk's compression job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressionRequest {
    /// Position of the chunk in its document (0-based)
    pub index: usize,
    /// Chunk text
    pub chunk: String,
    /// Prompt style
    pub style: Style,
    /// Word count the output should aim for
    pub target_words: usize,
    /// Ask for JSON-formatted output
    pub json: bool,
}

impl CompressionRequest {
    /// User prompt for this request
    pub fn prompt(&self) -> String {
        self.style.render(self.target_words, self.json, &self.chunk)
    }
}

/// Turns one chunk into compressed text. Infallible by contract.
pub trait ChunkCompressor: Sync {
    /// Compress a chunk; failures yield an empty string
    fn compress(&self, request: &CompressionRequest) -> String;
}

impl<F> ChunkCompressor for F
where
    F: Fn(&CompressionRequest) -> String + Sync,
{
    fn compress(&self, request: &CompressionRequest) -> String {
        self(request)
    }
}

/// Chunk compressor backed by a completion service
pub struct LlmCompressor<C: Completer> {
    completer: C,
    model: String,
    system: String,
}

impl<C: Completer> LlmCompressor<C> {
    /// Create a compressor that sends requests to `model`
    pub fn new(completer: C, model: impl Into<String>) -> Self {
        Self {
            completer,
            model: model.into(),
            system: TEXT_SYSTEM_PROMPT.to_owned(),
        }
    }

    /// Override the system prompt
    pub fn with_system_prompt(mut self, system: impl Into<String>) -> Self {
        self.system = system.into();
        self
    }

    /// System prompt in use
    pub fn system_prompt(&self) -> &str {
        &self.system
    }
}

impl<C: Completer> ChunkCompressor for LlmCompressor<C> {
    fn compress(&self, request: &CompressionRequest) -> String {
        log::info!(
            "Compressing chunk {} with target word count {}",
            request.index + 1,
            request.target_words
        );

        match self.completer.complete(&self.system, &request.prompt(), &self.model) {
            Ok(text) => text.trim().to_owned(),
            Err(e) => {
                log::warn!("An error occurred while processing chunk {}: {}", request.index + 1, e);
                String::new()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmError;
    use std::sync::Mutex;

    struct Recording {
        calls: Mutex<Vec<(String, String, String)>>,
        reply: Option<&'static str>,
    }

    impl Completer for Recording {
        fn complete(&self, system: &str, user: &str, model: &str) -> Result<String, LlmError> {
            self.calls
                .lock()
                .unwrap()
                .push((system.to_owned(), user.to_owned(), model.to_owned()));
            self.reply.map(str::to_owned).ok_or(LlmError::EmptyResponse)
        }
    }

    fn request(json: bool) -> CompressionRequest {
        CompressionRequest {
            index: 0,
            chunk: "a long passage".to_owned(),
            style: Style::BulletPoints,
            target_words: 12,
            json,
        }
    }

    #[test]
    fn test_success_is_trimmed() {
        let completer = Recording { calls: Mutex::new(Vec::new()), reply: Some("  short \n") };
        let compressor = LlmCompressor::new(&completer, "gpt-4o-mini");

        assert_eq!(compressor.compress(&request(false)), "short");

        let calls = completer.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        let (system, user, model) = &calls[0];
        assert_eq!(system, TEXT_SYSTEM_PROMPT);
        assert!(user.contains("12 words") && user.ends_with("a long passage"));
        assert_eq!(model, "gpt-4o-mini");
    }

    #[test]
    fn test_failure_becomes_empty_without_retry() {
        let completer = Recording { calls: Mutex::new(Vec::new()), reply: None };
        let compressor = LlmCompressor::new(&completer, "gpt-4o-mini");

        assert_eq!(compressor.compress(&request(false)), "");
        assert_eq!(completer.calls.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_json_flag_reaches_prompt() {
        assert!(request(true).prompt().contains("format the output as JSON"));
        assert!(!request(false).prompt().contains("JSON"));
    }

    #[test]
    fn test_closures_are_compressors() {
        let stub = |r: &CompressionRequest| r.chunk.to_uppercase();
        assert_eq!(stub.compress(&request(false)), "A LONG PASSAGE");
    }
}
