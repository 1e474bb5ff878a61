//! AI Core - Generation client and response cache
//!
//! Provides the generation port, an Ollama-compatible client that streams
//! `/api/generate` responses, and a file-backed cache that answers repeated
//! requests without contacting the server.

pub mod cache;
pub mod config;
pub mod error;
pub mod metrics;
pub mod ollama;
pub mod ports;

pub use cache::{CacheEntry, CacheParameters, CacheStats, ResponseCache, compute_fingerprint};
pub use config::{CacheConfig, GenerationConfig};
pub use error::{CacheError, GenerationError};
pub use metrics::{CallMetrics, SystemMetrics};
pub use ollama::OllamaGenerationClient;
pub use ports::{GenerationEngine, GenerationResult, TextStream};
