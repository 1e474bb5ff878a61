//! Process resource snapshots taken around a generation call
//!
//! Snapshots are read from `/proc` on Linux. Elsewhere, or when the files
//! cannot be parsed, the numeric fields are zero.

use std::{fs, time::Duration};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const PROC_STATUS: &str = "/proc/self/status";
const PROC_MEMINFO: &str = "/proc/meminfo";

/// Point-in-time resource usage of the current process
///
/// Only Linux exposes the figures through `/proc`. On other platforms, or when
/// `/proc` is unreadable, `memory_mb`, `memory_percent` and `num_threads` are
/// zero and only `captured_at` is meaningful.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemMetrics {
    /// Resident set size in MiB
    pub memory_mb: f64,
    /// Resident set size as a percentage of physical memory
    pub memory_percent: f64,
    /// Number of threads in the process
    pub num_threads: u32,
    /// When the snapshot was taken
    pub captured_at: DateTime<Utc>,
}

impl SystemMetrics {
    /// Take a snapshot of the current process
    #[must_use]
    pub fn capture() -> Self {
        let status = fs::read_to_string(PROC_STATUS).unwrap_or_default();
        let meminfo = fs::read_to_string(PROC_MEMINFO).unwrap_or_default();
        Self::from_proc(&status, &meminfo)
    }

    /// Take a snapshot without blocking the async runtime
    pub async fn capture_async() -> Self {
        let (status, meminfo) = tokio::join!(
            tokio::fs::read_to_string(PROC_STATUS),
            tokio::fs::read_to_string(PROC_MEMINFO),
        );
        Self::from_proc(&status.unwrap_or_default(), &meminfo.unwrap_or_default())
    }

    #[allow(clippy::cast_precision_loss)]
    fn from_proc(status: &str, meminfo: &str) -> Self {
        let rss_kib = proc_field(status, "VmRSS:").unwrap_or(0);
        let total_kib = proc_field(meminfo, "MemTotal:").unwrap_or(0);
        let num_threads = proc_field(status, "Threads:")
            .and_then(|n| u32::try_from(n).ok())
            .unwrap_or(0);

        let memory_percent = if total_kib == 0 {
            0.0
        } else {
            rss_kib as f64 / total_kib as f64 * 100.0
        };

        Self {
            memory_mb: rss_kib as f64 / 1024.0,
            memory_percent,
            num_threads,
            captured_at: Utc::now(),
        }
    }
}

/// First numeric value of a `Key:  value [unit]` line
fn proc_field(contents: &str, key: &str) -> Option<u64> {
    contents
        .lines()
        .find_map(|line| line.strip_prefix(key))
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|value| value.parse().ok())
}

/// Observability payload attached to a generation result
///
/// Failed calls only carry the start snapshot; the `end_*` and derived
/// fields are filled on success.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallMetrics {
    pub start_metrics: SystemMetrics,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_metrics: Option<SystemMetrics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_increase_mb: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_ms: Option<u64>,
    pub prompt_length: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_length: Option<usize>,
    pub model: String,
}

impl CallMetrics {
    /// Metrics for a call that failed after the start snapshot
    pub fn started(start: SystemMetrics, model: impl Into<String>, prompt_length: usize) -> Self {
        Self {
            start_metrics: start,
            end_metrics: None,
            memory_increase_mb: None,
            elapsed_ms: None,
            prompt_length,
            response_length: None,
            model: model.into(),
        }
    }

    /// Metrics for a completed call
    #[must_use]
    pub fn finished(self, end: SystemMetrics, elapsed: Duration, response_length: usize) -> Self {
        #[allow(clippy::cast_possible_truncation)]
        let elapsed_ms = elapsed.as_millis() as u64;

        Self {
            memory_increase_mb: Some(end.memory_mb - self.start_metrics.memory_mb),
            end_metrics: Some(end),
            elapsed_ms: Some(elapsed_ms),
            response_length: Some(response_length),
            ..self
        }
    }

    /// Whether the call completed (an end snapshot exists)
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.end_metrics.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STATUS: &str = "Name:\tconvo\nVmPeak:\t  200000 kB\nVmRSS:\t   51200 kB\nThreads:\t7\n";
    const MEMINFO: &str = "MemTotal:       1024000 kB\nMemFree:         512000 kB\n";

    fn snapshot(memory_mb: f64) -> SystemMetrics {
        SystemMetrics {
            memory_mb,
            memory_percent: 1.0,
            num_threads: 4,
            captured_at: Utc::now(),
        }
    }

    #[test]
    fn parses_proc_status() {
        let metrics = SystemMetrics::from_proc(STATUS, MEMINFO);
        assert!((metrics.memory_mb - 50.0).abs() < f64::EPSILON);
        assert!((metrics.memory_percent - 5.0).abs() < 1e-9);
        assert_eq!(metrics.num_threads, 7);
    }

    #[test]
    fn missing_proc_data_yields_zeros() {
        let metrics = SystemMetrics::from_proc("", "");
        assert!(metrics.memory_mb.abs() < f64::EPSILON);
        assert!(metrics.memory_percent.abs() < f64::EPSILON);
        assert_eq!(metrics.num_threads, 0);
    }

    #[test]
    fn capture_does_not_panic() {
        let metrics = SystemMetrics::capture();
        assert!(metrics.memory_mb >= 0.0);
    }

    #[tokio::test]
    async fn async_capture_matches_platform_support() {
        let metrics = SystemMetrics::capture_async().await;
        if cfg!(target_os = "linux") {
            assert!(metrics.memory_mb > 0.0);
            assert!(metrics.num_threads >= 1);
        } else {
            assert!(metrics.memory_mb.abs() < f64::EPSILON);
            assert_eq!(metrics.num_threads, 0);
        }
    }

    #[test]
    fn proc_field_ignores_other_keys() {
        assert_eq!(proc_field(STATUS, "VmPeak:"), Some(200_000));
        assert_eq!(proc_field(STATUS, "VmSwap:"), None);
    }

    #[test]
    fn started_metrics_have_no_end() {
        let metrics = CallMetrics::started(snapshot(10.0), "phi", 12);
        assert!(!metrics.is_complete());
        assert!(metrics.memory_increase_mb.is_none());
        assert_eq!(metrics.prompt_length, 12);
        assert_eq!(metrics.model, "phi");
    }

    #[test]
    fn finished_metrics_compute_memory_increase() {
        let metrics = CallMetrics::started(snapshot(10.0), "phi", 12).finished(
            snapshot(12.5),
            Duration::from_millis(250),
            30,
        );
        assert!(metrics.is_complete());
        assert!((metrics.memory_increase_mb.unwrap() - 2.5).abs() < f64::EPSILON);
        assert_eq!(metrics.elapsed_ms, Some(250));
        assert_eq!(metrics.response_length, Some(30));
    }

    #[test]
    fn started_metrics_serialize_without_end_fields() {
        let metrics = CallMetrics::started(snapshot(10.0), "phi", 3);
        let json = serde_json::to_value(&metrics).unwrap();
        assert!(json.get("start_metrics").is_some());
        assert!(json.get("end_metrics").is_none());
        assert!(json.get("memory_increase_mb").is_none());
    }
}
