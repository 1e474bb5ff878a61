//! Response cache
//!
//! Generated responses are stored one file per request fingerprint, so that
//! identical requests (same model, prompt and sampling parameters) can be
//! answered without contacting the generation service:
//! - `compute_fingerprint`: canonical JSON + BLAKE3 identity of a request
//! - `ResponseCache`: file-backed store with lazy TTL expiry

mod file_cache;

use std::collections::BTreeMap;

use serde_json::{Map, Value};

pub use file_cache::{CacheEntry, ResponseCache};

/// Auxiliary request parameters that take part in the fingerprint
pub type CacheParameters = BTreeMap<String, Value>;

/// Compute the fingerprint of a cacheable request
///
/// The request is serialised as a compact JSON object `{model, prompt,
/// ...parameters}` with keys sorted at every nesting level, then hashed
/// with BLAKE3. The result is 64 lowercase hex characters.
///
/// A parameter named `model` or `prompt` is shadowed by the request's own
/// model and prompt.
#[must_use]
pub fn compute_fingerprint(model: &str, prompt: &str, parameters: &CacheParameters) -> String {
    let mut root: Map<String, Value> = parameters
        .iter()
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    root.insert("model".to_string(), Value::from(model));
    root.insert("prompt".to_string(), Value::from(prompt));

    let mut canonical = String::new();
    write_canonical(&Value::Object(root), &mut canonical);

    blake3::hash(canonical.as_bytes()).to_hex().to_string()
}

/// Serialise with sorted object keys regardless of how `Map` orders them
fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_unstable_by(|a, b| a.0.cmp(b.0));

            out.push('{');
            for (i, (key, value)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::from(key.as_str()).to_string());
                out.push(':');
                write_canonical(value, out);
            }
            out.push('}');
        },
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        },
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Cache statistics for monitoring
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups answered from the cache
    pub hits: u64,
    /// Lookups that found no valid entry
    pub misses: u64,
    /// Entries written successfully
    pub writes: u64,
    /// Entries removed because they were expired or corrupt
    pub evictions: u64,
}

impl CacheStats {
    /// Calculate the hit rate as a fraction (0.0 - 1.0)
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
