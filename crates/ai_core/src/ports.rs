//! Port definitions for generation engines
//!
//! Defines the trait (port) that generation adapters implement and the
//! uniform result type every call returns.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::{error::GenerationError, metrics::CallMetrics};

/// Outcome of a `generate` call
///
/// Failures never surface as a `Result::Err`; they are reported through
/// `error` with empty `text`.
#[derive(Debug, Default)]
pub struct GenerationResult {
    /// Generated text, trimmed; empty on failure
    pub text: String,
    /// Present when the call failed
    pub error: Option<GenerationError>,
    /// Resource snapshots; absent for cache hits and rejected prompts
    pub metrics: Option<CallMetrics>,
    /// Whether the text was served from the response cache
    pub cached: bool,
}

impl GenerationResult {
    /// A freshly generated response
    pub fn success(text: impl Into<String>, metrics: CallMetrics) -> Self {
        Self {
            text: text.into(),
            metrics: Some(metrics),
            ..Default::default()
        }
    }

    /// A response served from the cache
    pub fn from_cache(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            cached: true,
            ..Default::default()
        }
    }

    /// A failed call
    pub fn failure(error: GenerationError, metrics: Option<CallMetrics>) -> Self {
        Self {
            error: Some(error),
            metrics,
            ..Default::default()
        }
    }

    /// Whether the call produced text without error
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// User-facing error message, if the call failed
    #[must_use]
    pub fn error_message(&self) -> Option<String> {
        self.error.as_ref().map(ToString::to_string)
    }
}

/// Lazily produced text fragments
///
/// Finite and not restartable. Dropping the stream early releases the
/// underlying connection.
pub type TextStream = Pin<Box<dyn Stream<Item = String> + Send>>;

/// Port for text generation implementations
#[async_trait]
pub trait GenerationEngine: Send + Sync {
    /// Generate a complete response, consulting the response cache
    async fn generate(&self, prompt: &str) -> GenerationResult;

    /// Stream response fragments as they arrive, bypassing the cache
    ///
    /// Failures are reported as a single final `Error: ...` fragment.
    fn generate_stream(&self, prompt: &str) -> TextStream;

    /// Check if the generation server is reachable
    async fn health_check(&self) -> Result<bool, GenerationError>;

    /// Model used for the next call
    fn model(&self) -> String;

    /// Switch the model for subsequent calls
    fn set_model(&self, model: &str);
}
