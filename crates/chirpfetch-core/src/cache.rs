//! Persisted cache of successful acquisitions, consulted before the rate
//! budget so a fresh hit costs no network call.
//!
//! The cache is a single JSON document keyed by normalized handle:
//!
//! ```json
//! {"entries": {"example": {"source": "syndication_api", "requested": 5, "stored_at": 1700000000.5, "items": []}}}
//! ```
//!
//! Like the rate-limit state, storage errors never surface: an unreadable
//! file is a miss and a failed write is logged and ignored.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::rate_limit::{Clock, StoreError, SystemClock};
use crate::{Handle, NormalizedItem};

/// Entries older than this are ignored unless configured otherwise.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// How one acquisition treats the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheMode {
    /// Serve a fresh entry if present; otherwise acquire and store the result.
    #[default]
    Use,
    /// Always acquire, then store the result.
    Refresh,
    /// Always acquire and leave the cache untouched.
    Bypass,
}

impl CacheMode {
    pub const fn reads(self) -> bool {
        matches!(self, Self::Use)
    }

    pub const fn writes(self) -> bool {
        !matches!(self, Self::Bypass)
    }
}

/// One stored acquisition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedAcquisition {
    /// Strategy that produced the items.
    pub source: String,
    /// `max_count` of the acquisition that produced the entry.
    pub requested: usize,
    /// Fractional epoch seconds.
    pub stored_at: f64,
    pub items: Vec<NormalizedItem>,
}

impl CachedAcquisition {
    /// Whether the entry can answer a request for `max_count` items. A
    /// source that returned fewer items than asked for had no more to give.
    pub fn covers(&self, max_count: usize) -> bool {
        self.items.len() >= max_count || self.requested >= max_count
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheDocument {
    entries: BTreeMap<String, CachedAcquisition>,
}

/// File-backed acquisition cache.
#[derive(Clone)]
pub struct ResponseCache {
    path: PathBuf,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl ResponseCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ttl: DEFAULT_CACHE_TTL,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Fresh entry for `handle`, if any.
    pub fn get(&self, handle: &Handle) -> Option<CachedAcquisition> {
        let now = self.clock.now();
        let mut document = match self.load() {
            Ok(document) => document,
            Err(error) => {
                tracing::warn!(%error, "response cache unreadable; treating as a miss");
                return None;
            }
        };
        document
            .entries
            .remove(handle.as_str())
            .filter(|entry| self.is_fresh(entry, now))
    }

    /// Stores `items` for `handle`, dropping expired entries on the way.
    pub fn put(&self, handle: &Handle, source: &str, requested: usize, items: &[NormalizedItem]) {
        let now = self.clock.now();
        let mut document = self.load().unwrap_or_default();
        document.entries.retain(|_, entry| self.is_fresh(entry, now));
        document.entries.insert(
            handle.as_str().to_owned(),
            CachedAcquisition {
                source: source.to_owned(),
                requested,
                stored_at: now,
                items: items.to_vec(),
            },
        );

        if let Err(error) = self.save(&document) {
            tracing::warn!(%error, "failed to persist response cache");
        }
    }

    /// Removes the cache file. Returns how many entries it held; a corrupt
    /// file counts as zero.
    pub fn clear(&self) -> Result<usize, StoreError> {
        let removed = self.load().map(|document| document.entries.len()).unwrap_or(0);
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(removed),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(0),
            Err(error) => Err(error.into()),
        }
    }

    // Entries stamped in the future are treated as stale.
    fn is_fresh(&self, entry: &CachedAcquisition, now: f64) -> bool {
        let age = now - entry.stored_at;
        age.is_finite() && age >= 0.0 && age < self.ttl.as_secs_f64()
    }

    fn load(&self) -> Result<CacheDocument, StoreError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(CacheDocument::default()),
            Err(error) => return Err(error.into()),
        };
        Ok(serde_json::from_str(&raw)?)
    }

    fn save(&self, document: &CacheDocument) -> Result<(), StoreError> {
        fs::write(&self.path, serde_json::to_string(document)?)?;
        Ok(())
    }
}

impl std::fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCache")
            .field("path", &self.path)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}
