//! Crate-level error type

use thiserror::Error;

use crate::config::ConfigError;
use crate::llm::LlmError;
use crate::remote::RemoteError;

/// Errors surfaced by the compression tools
#[derive(Debug, Error)]
pub enum CondenseError {
    #[error("target token count must be a positive integer")]
    InvalidTarget,

    #[error("file not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize output: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Result alias for engine operations
pub type Result<T> = std::result::Result<T, CondenseError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        assert_eq!(
            CondenseError::InvalidTarget.to_string(),
            "target token count must be a positive integer"
        );
        assert_eq!(CondenseError::NotFound("a.txt".to_owned()).to_string(), "file not found: a.txt");
    }

    #[test]
    fn test_remote_errors_pass_through() {
        let err: CondenseError = RemoteError::InvalidUrl("x".to_owned()).into();
        assert!(matches!(err, CondenseError::Remote(_)));
        assert_eq!(err.to_string(), "invalid repository URL: x");
    }
}
