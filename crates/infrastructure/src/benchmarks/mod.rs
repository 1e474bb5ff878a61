//! Performance benchmarking
//!
//! - `PerformanceRecorder`: persistent JSON store of metric values by category
//! - `Measurement`: elapsed time and memory delta around a block of work

mod measurement;
mod recorder;

pub use measurement::{Measurement, MeasurementSummary};
pub use recorder::{MetricRecord, PerformanceRecorder};

/// Error persisting recorded metrics
#[derive(Debug, thiserror::Error)]
pub enum BenchmarkError {
    /// Reading or writing the metrics file failed
    #[error("Metrics file I/O failed for {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Recorded metrics could not be serialized
    #[error("Failed to serialize metrics: {0}")]
    Serialize(#[from] serde_json::Error),
}
