//! Performance metric recording settings.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::default_true;

/// Where and whether measured calls are recorded
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkConfig {
    /// Whether measurements are recorded
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// JSON file mapping metric category to recorded values
    #[serde(default = "default_metrics_file")]
    pub metrics_file: PathBuf,
}

fn default_metrics_file() -> PathBuf {
    PathBuf::from("output/performance_metrics.json")
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            metrics_file: default_metrics_file(),
        }
    }
}
