//! Persistent metric recorder

use std::{
    collections::BTreeMap,
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::BenchmarkError;

/// One recorded metric value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    /// Free-form context stored alongside the value
    #[serde(flatten)]
    pub metadata: Map<String, Value>,
}

/// Metric values grouped by category, persisted as one JSON file
#[derive(Debug)]
pub struct PerformanceRecorder {
    path: PathBuf,
    metrics: BTreeMap<String, Vec<MetricRecord>>,
}

impl PerformanceRecorder {
    /// Open the metrics file at `path`, creating it if needed
    ///
    /// A file that cannot be parsed is replaced by an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, BenchmarkError> {
        let path = path.into();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| BenchmarkError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let metrics = match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "Could not load metrics file, starting fresh"
                );
                BTreeMap::new()
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => return Err(BenchmarkError::Io { path, source }),
        };

        let recorder = Self { path, metrics };
        recorder.save()?;
        Ok(recorder)
    }

    /// Path of the metrics file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a value to `category` and persist
    pub fn record(
        &mut self,
        category: &str,
        value: f64,
        metadata: Map<String, Value>,
    ) -> Result<(), BenchmarkError> {
        self.metrics
            .entry(category.to_string())
            .or_default()
            .push(MetricRecord {
                timestamp: Utc::now(),
                value,
                metadata,
            });

        debug!(category, value, "Recorded metric");
        self.save()
    }

    /// Values recorded for `category`, oldest first
    pub fn records(&self, category: &str) -> &[MetricRecord] {
        self.metrics
            .get(category)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Recorded category names
    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.metrics.keys().map(String::as_str)
    }

    fn save(&self) -> Result<(), BenchmarkError> {
        let bytes = serde_json::to_vec_pretty(&self.metrics)?;
        let io_error = |source: io::Error| BenchmarkError::Io {
            path: self.path.clone(),
            source,
        };

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut tmp = tempfile::Builder::new()
            .prefix(".metrics-")
            .suffix(".tmp")
            .tempfile_in(dir)
            .map_err(io_error)?;
        tmp.write_all(&bytes).map_err(io_error)?;
        tmp.as_file().sync_all().map_err(io_error)?;
        tmp.persist(&self.path).map_err(|e| io_error(e.error))?;
        Ok(())
    }
}
