//! File-backed response cache
//!
//! Each entry lives in `{dir}/{fingerprint}.json`. Entries expire lazily: a
//! lookup that finds an expired or unreadable entry deletes it and reports a
//! miss. Writes go to a temporary file in the same directory which is then
//! renamed over the entry, so a reader never sees a partially written file.

use std::{
    io::{self, Write},
    path::{Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, error, info, instrument, warn};

use super::{CacheParameters, CacheStats, compute_fingerprint};
use crate::{config::CacheConfig, error::CacheError};

const ENTRY_EXTENSION: &str = "json";

/// A cached response as stored on disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Write time, stored as ISO-8601 under `timestamp`
    #[serde(rename = "timestamp")]
    pub created_at: DateTime<Utc>,
    pub model: String,
    pub prompt: String,
    pub response: String,
    pub parameters: CacheParameters,
}

impl CacheEntry {
    /// Create an entry stamped with the current time
    pub fn new(
        model: impl Into<String>,
        prompt: impl Into<String>,
        response: impl Into<String>,
        parameters: CacheParameters,
    ) -> Self {
        Self {
            created_at: Utc::now(),
            model: model.into(),
            prompt: prompt.into(),
            response: response.into(),
            parameters,
        }
    }

    /// Fingerprint addressing this entry
    #[must_use]
    pub fn fingerprint(&self) -> String {
        compute_fingerprint(&self.model, &self.prompt, &self.parameters)
    }

    /// Whether the entry is older than `ttl` at `now`
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        let ttl = TimeDelta::from_std(ttl).unwrap_or(TimeDelta::MAX);
        now.signed_duration_since(self.created_at) > ttl
    }
}

/// File-backed cache for generated responses
///
/// Safe to share between tasks and between processes pointing at the same
/// directory. Lookup and write failures are logged and absorbed; only
/// construction can fail.
pub struct ResponseCache {
    dir: PathBuf,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    evictions: AtomicU64,
}

impl std::fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCache")
            .field("dir", &self.dir)
            .field("ttl", &self.ttl)
            .field("hits", &self.hits.load(Ordering::Relaxed))
            .field("misses", &self.misses.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl ResponseCache {
    /// Open a cache rooted at `dir`, creating the directory if needed
    pub fn new(dir: impl Into<PathBuf>, ttl: Duration) -> Result<Self, CacheError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|source| CacheError::CreateDir {
            path: dir.clone(),
            source,
        })?;

        debug!(dir = %dir.display(), ttl_secs = ttl.as_secs(), "Opened response cache");

        Ok(Self {
            dir,
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        })
    }

    /// Open a cache from configuration
    pub fn from_config(config: &CacheConfig) -> Result<Self, CacheError> {
        Self::new(&config.directory, config.ttl())
    }

    /// Directory holding the entries
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Entry time-to-live
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Path of the file backing `fingerprint`
    #[must_use]
    pub fn entry_path(&self, fingerprint: &str) -> PathBuf {
        self.dir.join(format!("{fingerprint}.{ENTRY_EXTENSION}"))
    }

    /// Current hit/miss/write/eviction counters
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    /// Look up a cached response
    ///
    /// Returns `None` when no entry exists, when the entry is expired, or
    /// when it cannot be read. Expired and malformed entries are deleted.
    #[instrument(skip_all, fields(model = %model))]
    pub async fn get(
        &self,
        model: &str,
        prompt: &str,
        parameters: &CacheParameters,
    ) -> Option<String> {
        let fingerprint = compute_fingerprint(model, prompt, parameters);
        let path = self.entry_path(&fingerprint);

        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(%fingerprint, "Cache miss");
                return self.miss();
            },
            Err(e) => {
                warn!(%fingerprint, error = %e, "Cache read error");
                return self.miss();
            },
        };

        let entry: CacheEntry = match serde_json::from_slice(&bytes) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(%fingerprint, error = %e, "Malformed cache entry, removing");
                self.evict(&path, &bytes).await;
                return self.miss();
            },
        };

        if entry.is_expired_at(Utc::now(), self.ttl) {
            info!(%fingerprint, "Cache entry expired");
            self.evict(&path, &bytes).await;
            return self.miss();
        }

        self.hits.fetch_add(1, Ordering::Relaxed);
        debug!(%fingerprint, "Cache hit");
        Some(entry.response)
    }

    /// Store a response, replacing any entry under the same fingerprint
    ///
    /// Failures are logged; the cache is best-effort.
    #[instrument(skip_all, fields(model = %model))]
    pub async fn set(
        &self,
        model: &str,
        prompt: &str,
        response: &str,
        parameters: &CacheParameters,
    ) {
        let entry = CacheEntry::new(model, prompt, response, parameters.clone());
        let fingerprint = entry.fingerprint();
        let path = self.entry_path(&fingerprint);

        let bytes = match serde_json::to_vec_pretty(&entry) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(%fingerprint, error = %e, "Failed to serialize cache entry");
                return;
            },
        };

        let dir = self.dir.clone();
        let target = path.clone();
        let written =
            tokio::task::spawn_blocking(move || write_atomically(&dir, &target, &bytes)).await;

        match written {
            Ok(Ok(())) => {
                self.writes.fetch_add(1, Ordering::Relaxed);
                debug!(%fingerprint, "Cached response");
            },
            Ok(Err(e)) => {
                error!(path = %path.display(), error = %e, "Failed to write cache entry");
            },
            Err(e) => {
                error!(path = %path.display(), error = %e, "Cache write task failed");
            },
        }
    }

    /// Delete every entry, returning how many were removed
    ///
    /// A failure to delete one entry is logged and does not stop the rest.
    pub async fn clear(&self) -> usize {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) => {
                error!(dir = %self.dir.display(), error = %e, "Failed to list cache directory");
                return 0;
            },
        };

        let mut removed = 0;
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    error!(dir = %self.dir.display(), error = %e, "Failed to read cache directory");
                    break;
                },
            };

            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(ENTRY_EXTENSION) {
                continue;
            }

            match fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(e) => {
                    error!(path = %path.display(), error = %e, "Failed to delete cache entry");
                },
            }
        }

        info!(removed, "Cache cleared");
        removed
    }

    fn miss(&self) -> Option<String> {
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Remove the entry at `path` if it still holds `seen`
    ///
    /// An entry replaced by a concurrent `set` since it was read is kept. The
    /// re-read and the unlink are not atomic, so a write landing between them
    /// can still be lost; that costs one cache miss, never a torn entry.
    async fn evict(&self, path: &Path, seen: &[u8]) {
        match fs::read(path).await {
            Ok(current) if current != seen => {
                debug!(path = %path.display(), "Cache entry replaced, keeping it");
                return;
            },
            Ok(_) => {},
            Err(e) if e.kind() == io::ErrorKind::NotFound => return,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to re-read cache entry");
                return;
            },
        }

        match fs::remove_file(path).await {
            Ok(()) => {
                self.evictions.fetch_add(1, Ordering::Relaxed);
            },
            // Another reader got there first
            Err(e) if e.kind() == io::ErrorKind::NotFound => {},
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove cache entry"),
        }
    }
}

/// Write `bytes` to a temp file in `dir`, then rename it onto `target`
fn write_atomically(dir: &Path, target: &Path, bytes: &[u8]) -> io::Result<()> {
    std::fs::create_dir_all(dir)?;

    let mut temp = tempfile::Builder::new()
        .prefix(".entry-")
        .suffix(".tmp")
        .tempfile_in(dir)?;
    temp.write_all(bytes)?;
    temp.as_file().sync_all()?;
    temp.persist(target).map_err(|e| e.error)?;

    Ok(())
}
