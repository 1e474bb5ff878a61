//! Explicit before/after measurement of a unit of work

use std::time::{Duration, Instant};

use ai_core::SystemMetrics;
use serde_json::{Map, Value};

use super::{BenchmarkError, PerformanceRecorder};

/// An in-flight measurement started with [`Measurement::start`]
#[derive(Debug)]
pub struct Measurement {
    category: String,
    function: String,
    started: Instant,
    start_memory_mb: f64,
}

/// What a finished measurement recorded
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeasurementSummary {
    pub elapsed: Duration,
    pub memory_delta_mb: f64,
}

impl Measurement {
    /// Snapshot the clock and process memory
    pub fn start(category: impl Into<String>, function: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            function: function.into(),
            start_memory_mb: SystemMetrics::capture().memory_mb,
            started: Instant::now(),
        }
    }

    /// Record `{category}_time` in seconds and `{category}_memory` in MiB
    pub fn finish(
        self,
        recorder: &mut PerformanceRecorder,
    ) -> Result<MeasurementSummary, BenchmarkError> {
        let elapsed = self.started.elapsed();
        let memory_delta_mb = SystemMetrics::capture().memory_mb - self.start_memory_mb;

        let mut metadata = Map::new();
        metadata.insert("function".to_string(), Value::from(self.function));

        recorder.record(
            &format!("{}_time", self.category),
            elapsed.as_secs_f64(),
            metadata.clone(),
        )?;
        recorder.record(
            &format!("{}_memory", self.category),
            memory_delta_mb,
            metadata,
        )?;

        Ok(MeasurementSummary {
            elapsed,
            memory_delta_mb,
        })
    }
}
