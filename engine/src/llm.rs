//! Chat-completion client
//!
//! Every tool talks to the model through the [`Completer`] trait:
//! `complete(system, user, model) -> text`. [`OpenAiClient`] is the blocking
//! HTTP implementation; tests substitute their own.

use crate::config::Settings;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Default endpoint root
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Completion errors. Callers treat every variant as one failed call.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("API key not set: export {0}")]
    MissingApiKey(String),

    #[error("failed to build HTTP client: {0}")]
    Client(String),

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("completion API HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to parse response: {0}")]
    Malformed(String),

    #[error("completion API error: {0}")]
    Api(String),

    #[error("completion API returned no content")]
    EmptyResponse,
}

/// A synchronous completion service
pub trait Completer: Send + Sync {
    /// Send one system + user exchange to `model` and return the reply text
    fn complete(&self, system: &str, user: &str, model: &str) -> Result<String, LlmError>;
}

impl<T: Completer + ?Sized> Completer for &T {
    fn complete(&self, system: &str, user: &str, model: &str) -> Result<String, LlmError> {
        (**self).complete(system, user, model)
    }
}

impl<T: Completer + ?Sized> Completer for Box<T> {
    fn complete(&self, system: &str, user: &str, model: &str) -> Result<String, LlmError> {
        (**self).complete(system, user, model)
    }
}

// ── Wire types ──────────────────────────────────────────────────────

#[derive(Serialize, Debug)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize, Debug)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize, Debug)]
struct RawChatResponse {
    choices: Option<Vec<RawChoice>>,
    error: Option<ApiErrorResponse>,
}

#[derive(Deserialize, Debug)]
struct RawChoice {
    message: RawResponseMessage,
}

#[derive(Deserialize, Debug)]
struct RawResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ApiErrorResponse {
    message: String,
}

/// Pull the first choice's text out of a response body
fn parse_completion(body: &str) -> Result<String, LlmError> {
    let parsed: RawChatResponse =
        serde_json::from_str(body).map_err(|e| LlmError::Malformed(e.to_string()))?;

    if let Some(err) = parsed.error {
        return Err(LlmError::Api(err.message));
    }

    parsed
        .choices
        .and_then(|c| c.into_iter().next())
        .and_then(|c| c.message.content)
        .map(|content| content.trim().to_owned())
        .ok_or(LlmError::EmptyResponse)
}

// ── Client ──────────────────────────────────────────────────────────

/// Blocking HTTP client for OpenAI-compatible chat completions
pub struct OpenAiClient {
    client: reqwest::blocking::Client,
    api_key: String,
    endpoint: String,
}

impl OpenAiClient {
    /// Create a client for `base_url` with a per-request timeout
    pub fn new(
        api_key: impl Into<String>,
        base_url: &str,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("condense/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::Client(e.to_string()))?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
        })
    }

    /// Create a client from settings, reading the key from the configured
    /// environment variable
    pub fn from_settings(settings: &Settings) -> Result<Self, LlmError> {
        let api_key = std::env::var(&settings.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| LlmError::MissingApiKey(settings.api_key_env.clone()))?;

        Self::new(api_key, &settings.base_url, Duration::from_secs(settings.timeout_secs))
    }

    /// Full completions URL
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Completer for OpenAiClient {
    fn complete(&self, system: &str, user: &str, model: &str) -> Result<String, LlmError> {
        let body = ChatRequest {
            model,
            messages: vec![
                ChatMessage { role: "system", content: system },
                ChatMessage { role: "user", content: user },
            ],
        };
        log::debug!("LLM request: model={}, prompt={} bytes", model, user.len());

        let start = Instant::now();
        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()?;

        let status = resp.status();
        let text = resp.text()?;
        log::debug!(
            "LLM response: HTTP {} in {:.1}s ({} bytes)",
            status,
            start.elapsed().as_secs_f64(),
            text.len()
        );

        if !status.is_success() {
            return Err(LlmError::Status { status: status.as_u16(), body: text });
        }

        parse_completion(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_first_choice() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"  short  "}},{"message":{"content":"other"}}]}"#;
        assert_eq!(parse_completion(body).unwrap(), "short");
    }

    #[test]
    fn test_parse_api_error() {
        let body = r#"{"error":{"message":"invalid api key","type":"auth"}}"#;
        assert!(matches!(parse_completion(body), Err(LlmError::Api(m)) if m == "invalid api key"));
    }

    #[test]
    fn test_parse_empty_and_malformed() {
        assert!(matches!(parse_completion(r#"{"choices":[]}"#), Err(LlmError::EmptyResponse)));
        assert!(matches!(
            parse_completion(r#"{"choices":[{"message":{"content":null}}]}"#),
            Err(LlmError::EmptyResponse)
        ));
        assert!(matches!(parse_completion("<html>"), Err(LlmError::Malformed(_))));
    }

    #[test]
    fn test_endpoint_joins_base_url() {
        let client = OpenAiClient::new("k", "http://localhost:8080/v1/", Duration::from_secs(1)).unwrap();
        assert_eq!(client.endpoint(), "http://localhost:8080/v1/chat/completions");
    }

    #[test]
    fn test_missing_key_is_reported() {
        let settings = Settings {
            api_key_env: "CONDENSE_TEST_KEY_THAT_IS_NEVER_SET".to_owned(),
            ..Settings::default()
        };
        assert!(matches!(
            OpenAiClient::from_settings(&settings),
            Err(LlmError::MissingApiKey(var)) if var == "CONDENSE_TEST_KEY_THAT_IS_NEVER_SET"
        ));
    }

    #[test]
    fn test_request_shape() {
        let body = ChatRequest {
            model: "gpt-4o-mini",
            messages: vec![
                ChatMessage { role: "system", content: "sys" },
                ChatMessage { role: "user", content: "hi" },
            ],
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["model"], "gpt-4o-mini");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "hi");
    }
}
