//! Infrastructure layer - Configuration, logging and benchmarking
//!
//! Loads layered application configuration, installs the tracing
//! subscriber and persists performance measurements.

pub mod benchmarks;
pub mod config;
pub mod telemetry;

pub use benchmarks::{
    BenchmarkError, Measurement, MeasurementSummary, MetricRecord, PerformanceRecorder,
};
pub use config::{AppConfig, BenchmarkConfig, ConfigError};
pub use telemetry::{TelemetryConfig, TelemetryError, init_logging};
