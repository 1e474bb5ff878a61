//! Application configuration
//!
//! Sources are layered, later ones winning:
//! - built-in defaults
//! - `config.toml` in the working directory (optional) or an explicit file
//! - `CONVO__SECTION__KEY` environment variables
//! - the legacy `OLLAMA_BASE_URL` and `LLM_MODEL` variables

mod benchmarks;

use std::{collections::HashMap, path::Path};

use ai_core::{CacheConfig, GenerationConfig};
use serde::{Deserialize, Serialize};
use tracing::debug;
use validator::Validate;

pub use benchmarks::BenchmarkConfig;

use crate::telemetry::TelemetryConfig;

const ENV_PREFIX: &str = "CONVO";
const ENV_SEPARATOR: &str = "__";
const LEGACY_BASE_URL: &str = "OLLAMA_BASE_URL";
const LEGACY_MODEL: &str = "LLM_MODEL";

/// Shared default for boolean `true` fields across config structs
pub(crate) const fn default_true() -> bool {
    true
}

/// Error loading or validating configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A source could not be read or deserialized
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    /// Values were loaded but are out of range
    #[error("Invalid configuration: {0}")]
    Invalid(#[from] validator::ValidationErrors),
}

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Generation client configuration
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Response cache configuration
    #[serde(default)]
    pub cache: CacheConfig,

    /// Logging configuration
    #[serde(default)]
    pub telemetry: TelemetryConfig,

    /// Performance metric recording
    #[serde(default)]
    pub benchmarks: BenchmarkConfig,
}

impl AppConfig {
    /// Load configuration from `config.toml` (if present) and the environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_env(None, std::env::vars().collect())
    }

    /// Load configuration from a specific file and the environment
    ///
    /// Unlike [`AppConfig::load`], the file must exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        Self::load_with_env(Some(path), std::env::vars().collect())
    }

    /// Load configuration using `env` in place of the process environment
    pub fn load_with_env(
        path: Option<&Path>,
        env: HashMap<String, String>,
    ) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => config::File::from(path).required(true),
            None => config::File::with_name("config").required(false),
        };

        let legacy_base_url = env.get(LEGACY_BASE_URL).cloned();
        let legacy_model = env.get(LEGACY_MODEL).cloned();

        let builder = config::Config::builder()
            // Start with defaults
            .set_default("generation.base_url", "http://localhost:11434")?
            .set_default("generation.model", "phi")?
            // Load from file if exists
            .add_source(file)
            // Override with environment variables (e.g., CONVO__GENERATION__MODEL)
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator(ENV_SEPARATOR)
                    .separator(ENV_SEPARATOR)
                    .try_parsing(true)
                    .source(Some(env)),
            )
            .set_override_option("generation.base_url", legacy_base_url)?
            .set_override_option("generation.model", legacy_model)?;

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;

        debug!(
            base_url = %config.generation.base_url,
            model = %config.generation.model,
            cache_dir = %config.cache.directory.display(),
            "Configuration loaded"
        );

        Ok(config)
    }

    /// Check value ranges of every section
    pub fn validate(&self) -> Result<(), validator::ValidationErrors> {
        self.generation.validate()
    }
}

#[cfg(test)]
mod tests {
    use std::{io::Write, path::PathBuf};

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    fn config_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn app_config_default() {
        let config = AppConfig::default();
        assert_eq!(config.generation.base_url, "http://localhost:11434");
        assert_eq!(config.generation.model, "phi");
        assert_eq!(config.cache.directory, PathBuf::from("output/cache"));
        assert_eq!(config.cache.ttl_secs, 86_400);
        assert!(config.benchmarks.enabled);
    }

    #[test]
    fn load_without_sources_uses_defaults() {
        let file = config_file("");
        let config = AppConfig::load_with_env(Some(file.path()), HashMap::new()).unwrap();

        assert_eq!(config.generation.model, "phi");
        assert!((config.generation.temperature - 0.7).abs() < f64::EPSILON);
        assert!((config.generation.top_p - 0.9).abs() < f64::EPSILON);
        assert_eq!(config.generation.max_tokens, 2048);
        assert_eq!(config.generation.timeout_ms, 30_000);
    }

    #[test]
    fn file_values_override_defaults() {
        let file = config_file(
            r#"
[generation]
model = "llama3"
temperature = 0.2

[cache]
directory = "/tmp/convo-cache"
ttl_secs = 60

[benchmarks]
enabled = false
"#,
        );

        let config = AppConfig::load_with_env(Some(file.path()), HashMap::new()).unwrap();
        assert_eq!(config.generation.model, "llama3");
        assert!((config.generation.temperature - 0.2).abs() < f64::EPSILON);
        assert_eq!(config.generation.base_url, "http://localhost:11434");
        assert_eq!(config.cache.directory, PathBuf::from("/tmp/convo-cache"));
        assert_eq!(config.cache.ttl_secs, 60);
        assert!(!config.benchmarks.enabled);
    }

    #[test]
    fn prefixed_env_overrides_file() {
        let file = config_file("[generation]\nmodel = \"llama3\"\n");
        let vars = env(&[
            ("CONVO__GENERATION__MODEL", "mistral"),
            ("CONVO__GENERATION__MAX_TOKENS", "512"),
        ]);

        let config = AppConfig::load_with_env(Some(file.path()), vars).unwrap();
        assert_eq!(config.generation.model, "mistral");
        assert_eq!(config.generation.max_tokens, 512);
    }

    #[test]
    fn legacy_env_overrides_everything() {
        let file = config_file("[generation]\nmodel = \"llama3\"\n");
        let vars = env(&[
            ("CONVO__GENERATION__MODEL", "mistral"),
            ("LLM_MODEL", "phi3"),
            ("OLLAMA_BASE_URL", "http://ollama:11434"),
        ]);

        let config = AppConfig::load_with_env(Some(file.path()), vars).unwrap();
        assert_eq!(config.generation.model, "phi3");
        assert_eq!(config.generation.base_url, "http://ollama:11434");
    }

    #[test]
    fn out_of_range_temperature_is_rejected() {
        let file = config_file("[generation]\ntemperature = 1.5\n");
        let err = AppConfig::load_with_env(Some(file.path()), HashMap::new()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        let vars = env(&[("OLLAMA_BASE_URL", "not a url")]);
        let file = config_file("");
        let err = AppConfig::load_with_env(Some(file.path()), vars).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let err =
            AppConfig::load_with_env(Some(Path::new("/nonexistent/convo.toml")), HashMap::new())
                .unwrap_err();
        assert!(matches!(err, ConfigError::Load(_)));
        assert!(err.to_string().starts_with("Failed to load configuration"));
    }

    #[test]
    fn app_config_serialization_roundtrip() {
        let config = AppConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: AppConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.generation.model, config.generation.model);
        assert_eq!(parsed.benchmarks.metrics_file, config.benchmarks.metrics_file);
    }
}
