//! Ollama-compatible generation client
//!
//! Talks to the `/api/generate` endpoint of any Ollama-compatible server in
//! streaming mode and caches complete responses on disk.

mod client;
mod streaming;

pub use client::OllamaGenerationClient;
pub use streaming::ResponseFragments;
