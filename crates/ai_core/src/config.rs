//! Configuration for the generation client and the response cache

use std::{path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Configuration for the generation client
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct GenerationConfig {
    /// Base URL of the Ollama-compatible generation server
    #[serde(default = "default_base_url")]
    #[validate(url)]
    pub base_url: String,

    /// Model used until changed with `set_model`
    #[serde(default = "default_model")]
    #[validate(length(min = 1))]
    pub model: String,

    /// Temperature for sampling (0.0 - 1.0)
    #[serde(default = "default_temperature")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub temperature: f64,

    /// Top-p (nucleus) sampling (0.0 - 1.0)
    #[serde(default = "default_top_p")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub top_p: f64,

    /// Maximum tokens to generate
    #[serde(default = "default_max_tokens")]
    #[validate(range(min = 1))]
    pub max_tokens: u32,

    /// Timeout for the whole request, including reading the stream
    #[serde(default = "default_timeout_ms")]
    #[validate(range(min = 1))]
    pub timeout_ms: u64,
}

fn default_base_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_model() -> String {
    "phi".to_string()
}

const fn default_temperature() -> f64 {
    0.7
}

const fn default_top_p() -> f64 {
    0.9
}

const fn default_max_tokens() -> u32 {
    2048
}

const fn default_timeout_ms() -> u64 {
    30_000 // 30 seconds
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            max_tokens: default_max_tokens(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl GenerationConfig {
    /// Request timeout as a Duration
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Create config pointing at a specific server
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }
}

/// Configuration for the file-backed response cache
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Directory holding one JSON file per cached response
    #[serde(default = "default_cache_directory")]
    pub directory: PathBuf,

    /// Entry time-to-live in seconds (default: 24 hours)
    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,
}

fn default_cache_directory() -> PathBuf {
    PathBuf::from("output/cache")
}

const fn default_cache_ttl() -> u64 {
    24 * 60 * 60 // 24 hours
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            directory: default_cache_directory(),
            ttl_secs: default_cache_ttl(),
        }
    }
}

impl CacheConfig {
    /// Get the TTL as a Duration
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}
