//! Ollama generation client implementation

use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::stream;
use parking_lot::RwLock;
use reqwest::{Client, RequestBuilder};
use serde::Serialize;
use serde_json::Value;
use tracing::{Span, debug, field, info, instrument, warn};

use super::streaming::{error_fragment, fragment_stream, open};
use crate::{
    cache::{CacheParameters, ResponseCache, compute_fingerprint},
    config::GenerationConfig,
    error::GenerationError,
    metrics::{CallMetrics, SystemMetrics},
    ports::{GenerationEngine, GenerationResult, TextStream},
};

const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Generation client for Ollama-compatible servers
#[derive(Debug)]
pub struct OllamaGenerationClient {
    client: Client,
    config: GenerationConfig,
    model: RwLock<String>,
    cache: ResponseCache,
}

impl OllamaGenerationClient {
    /// Create a new client that stores complete responses in `cache`
    pub fn new(config: GenerationConfig, cache: ResponseCache) -> Result<Self, GenerationError> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| GenerationError::Other(e.to_string()))?;

        info!(
            base_url = %config.base_url,
            model = %config.model,
            cache_dir = %cache.dir().display(),
            "Initialized generation client"
        );

        Ok(Self {
            client,
            model: RwLock::new(config.model.clone()),
            config,
            cache,
        })
    }

    /// Configuration the client was built with
    pub const fn config(&self) -> &GenerationConfig {
        &self.config
    }

    /// The response cache
    pub const fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    /// Sampling parameters that take part in the cache identity
    #[must_use]
    pub fn cache_parameters(&self) -> CacheParameters {
        CacheParameters::from([
            ("temperature".to_string(), Value::from(self.config.temperature)),
            ("top_p".to_string(), Value::from(self.config.top_p)),
            ("max_tokens".to_string(), Value::from(self.config.max_tokens)),
        ])
    }

    /// Fingerprint `prompt` would be cached under with the current model
    #[must_use]
    pub fn fingerprint(&self, prompt: &str) -> String {
        compute_fingerprint(&self.model(), prompt, &self.cache_parameters())
    }

    /// Build the API URL for a given endpoint
    fn api_url(&self, endpoint: &str) -> String {
        format!(
            "{}/api/{}",
            self.config.base_url.trim_end_matches('/'),
            endpoint.trim_start_matches('/')
        )
    }

    fn generate_request(&self, model: &str, prompt: &str) -> RequestBuilder {
        let body = GenerateRequest {
            model,
            prompt,
            stream: true,
            options: GenerateOptions {
                temperature: self.config.temperature,
                top_p: self.config.top_p,
                num_predict: self.config.max_tokens,
            },
        };

        self.client.post(self.api_url("generate")).json(&body)
    }

    /// Send the request and accumulate every fragment of the response
    async fn accumulate(&self, model: &str, prompt: &str) -> Result<String, GenerationError> {
        let mut fragments = open(self.generate_request(model, prompt)).await?;

        let mut text = String::new();
        while let Some(fragment) = fragments.next_fragment().await? {
            text.push_str(&fragment);
        }

        if text.is_empty() {
            return Err(GenerationError::NoResponse);
        }
        Ok(text.trim().to_string())
    }
}

/// Ollama-format generate request
#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f64,
    top_p: f64,
    num_predict: u32,
}

#[async_trait]
impl GenerationEngine for OllamaGenerationClient {
    #[instrument(skip_all, fields(model = field::Empty, cached = field::Empty))]
    async fn generate(&self, prompt: &str) -> GenerationResult {
        if prompt.is_empty() {
            debug!("Rejected empty prompt");
            return GenerationResult::failure(GenerationError::EmptyPrompt, None);
        }

        let model = self.model();
        let span = Span::current();
        span.record("model", model.as_str());

        let parameters = self.cache_parameters();
        if let Some(text) = self.cache.get(&model, prompt, &parameters).await {
            span.record("cached", true);
            info!("Returning cached response");
            return GenerationResult::from_cache(text);
        }
        span.record("cached", false);

        let start = SystemMetrics::capture_async().await;
        let metrics = CallMetrics::started(start, &model, prompt.chars().count());
        let started = Instant::now();

        match self.accumulate(&model, prompt).await {
            Ok(text) => {
                let elapsed = started.elapsed();
                let end = SystemMetrics::capture_async().await;
                let metrics = metrics.finished(end, elapsed, text.chars().count());

                self.cache.set(&model, prompt, &text, &parameters).await;

                debug!(
                    elapsed_ms = metrics.elapsed_ms,
                    response_length = text.len(),
                    "Generation completed"
                );
                GenerationResult::success(text, metrics)
            },
            Err(e) => {
                warn!(error = %e, "Generation failed");
                GenerationResult::failure(e, Some(metrics))
            },
        }
    }

    fn generate_stream(&self, prompt: &str) -> TextStream {
        if prompt.is_empty() {
            debug!("Rejected empty prompt");
            return Box::pin(stream::iter([error_fragment(&GenerationError::EmptyPrompt)]));
        }

        let model = self.model();
        debug!(model = %model, "Starting streaming request");
        fragment_stream(self.generate_request(&model, prompt))
    }

    #[instrument(skip(self))]
    async fn health_check(&self) -> Result<bool, GenerationError> {
        let response = self
            .client
            .get(self.api_url("tags"))
            .timeout(HEALTH_CHECK_TIMEOUT)
            .send()
            .await;

        match response {
            Ok(resp) => Ok(resp.status().is_success()),
            Err(e) if e.is_timeout() || e.is_connect() => Ok(false),
            Err(e) => Err(GenerationError::from(e)),
        }
    }

    fn model(&self) -> String {
        self.model.read().clone()
    }

    fn set_model(&self, model: &str) {
        let previous = std::mem::replace(&mut *self.model.write(), model.to_string());
        info!(from = %previous, to = %model, "Switched generation model");
    }
}
