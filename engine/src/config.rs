//! Layered configuration
//!
//! Defaults, then a `.condense.{toml,yaml,yml,json}` file (or an explicit
//! path), then `CONDENSE_*` environment variables.

use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::llm::DEFAULT_BASE_URL;
use crate::tokenizer::DEFAULT_SAFETY_MARGIN;

/// Config files looked up in the working directory, first match wins
pub const CONFIG_FILES: [&str; 4] =
    [".condense.toml", ".condense.yaml", ".condense.yml", ".condense.json"];

/// Prefix for environment overrides
pub const ENV_PREFIX: &str = "CONDENSE_";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    NotFound(PathBuf),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error(transparent)]
    Figment(#[from] Box<figment::Error>),

    #[error("failed to render config: {0}")]
    Render(String),
}

/// Runtime settings shared by every subcommand
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Model identifier sent to the API and used to pick the tokenizer
    pub model: String,
    /// API root, e.g. `https://api.openai.com/v1`
    pub base_url: String,
    /// Environment variable holding the API key
    pub api_key_env: String,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
    /// Tokens held back from the context window
    pub safety_margin: usize,
    /// Convergence loop iteration cap
    pub max_iterations: u32,
    /// Aggression factor on the first iteration
    pub initial_aggression: f64,
    /// Aggression multiplier applied after every iteration
    pub aggression_growth: f64,
    /// Compress the chunks of one iteration in parallel
    pub parallel: bool,
    /// Glob patterns skipped by repository walks
    pub exclude: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_owned(),
            base_url: DEFAULT_BASE_URL.to_owned(),
            api_key_env: "OPENAI_API_KEY".to_owned(),
            timeout_secs: 120,
            safety_margin: DEFAULT_SAFETY_MARGIN,
            max_iterations: 100,
            initial_aggression: 1.2,
            aggression_growth: 1.1,
            parallel: false,
            exclude: Vec::new(),
        }
    }
}

impl Settings {
    /// Load settings from an explicit file, or the first default file in `dir`
    pub fn load(explicit: Option<&Path>, dir: &Path) -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        match explicit {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigError::NotFound(path.to_path_buf()));
                }
                figment = merge_file(figment, path);
            },
            None => {
                if let Some(path) = CONFIG_FILES.iter().map(|n| dir.join(n)).find(|p| p.exists()) {
                    log::debug!("Loading config from {}", path.display());
                    figment = merge_file(figment, &path);
                }
            },
        }

        let settings: Self = figment
            .merge(Env::prefixed(ENV_PREFIX))
            .extract()
            .map_err(Box::new)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject values the convergence loop cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model.trim().is_empty() {
            return Err(ConfigError::Invalid("model must not be empty".to_owned()));
        }
        if self.max_iterations == 0 {
            return Err(ConfigError::Invalid("max_iterations must be at least 1".to_owned()));
        }
        if self.initial_aggression.is_nan() || self.initial_aggression < 1.0 {
            return Err(ConfigError::Invalid("initial_aggression must be >= 1".to_owned()));
        }
        if self.aggression_growth.is_nan() || self.aggression_growth < 1.0 {
            return Err(ConfigError::Invalid("aggression_growth must be >= 1".to_owned()));
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::Invalid("timeout_secs must be positive".to_owned()));
        }
        Ok(())
    }

    /// Render the default settings in `format` (`toml`, `yaml` or `json`)
    pub fn generate_default(format: &str) -> Result<String, ConfigError> {
        let defaults = Self::default();
        match format {
            "toml" => toml::to_string_pretty(&defaults).map_err(|e| ConfigError::Render(e.to_string())),
            "yaml" | "yml" => serde_yaml::to_string(&defaults).map_err(|e| ConfigError::Render(e.to_string())),
            "json" => serde_json::to_string_pretty(&defaults).map_err(|e| ConfigError::Render(e.to_string())),
            other => Err(ConfigError::Render(format!("unsupported format: {}", other))),
        }
    }
}

fn merge_file(figment: Figment, path: &Path) -> Figment {
    match path.extension().and_then(|e| e.to_str()).unwrap_or("") {
        "yaml" | "yml" => figment.merge(Yaml::file(path)),
        "json" => figment.merge(Json::file(path)),
        _ => figment.merge(Toml::file(path)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_without_files() {
        let dir = TempDir::new().unwrap();
        let settings = Settings::load(None, dir.path()).unwrap();
        assert_eq!(settings.model, Settings::default().model);
        assert_eq!(settings.max_iterations, 100);
    }

    #[test]
    fn test_toml_file_overrides_defaults() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(".condense.toml"),
            "model = \"gpt-4\"\nparallel = true\nexclude = [\"tests/*\"]\n",
        )
        .unwrap();

        let settings = Settings::load(None, dir.path()).unwrap();
        assert_eq!(settings.model, "gpt-4");
        assert!(settings.parallel);
        assert_eq!(settings.exclude, vec!["tests/*".to_owned()]);
        assert_eq!(settings.timeout_secs, 120);
    }

    #[test]
    fn test_explicit_yaml_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("custom.yaml");
        fs::write(&path, "max_iterations: 7\ninitial_aggression: 1.5\n").unwrap();

        let settings = Settings::load(Some(&path), dir.path()).unwrap();
        assert_eq!(settings.max_iterations, 7);
        assert!((settings.initial_aggression - 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_missing_explicit_file() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(matches!(
            Settings::load(Some(&missing), dir.path()),
            Err(ConfigError::NotFound(_))
        ));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(".condense.json"), r#"{"initial_aggression": 0.5}"#).unwrap();
        assert!(matches!(Settings::load(None, dir.path()), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_generated_defaults_load_back() {
        for format in ["toml", "yaml", "json"] {
            let dir = TempDir::new().unwrap();
            let content = Settings::generate_default(format).unwrap();
            let path = dir.path().join(format!("config.{}", format));
            fs::write(&path, content).unwrap();

            let settings = Settings::load(Some(&path), dir.path()).unwrap();
            assert_eq!(settings, Settings::default(), "{format}");
        }
        assert!(Settings::generate_default("ini").is_err());
    }
}
