//! Response cache.
//!
//! Holds fully built responses (header block and encoded body) so a repeat
//! request skips both the disk read and the gzip pass. The store is bounded
//! by entry count and by total bytes; least recently used entries are
//! dropped first. Any entry can disappear between two calls, so a miss is
//! always a normal outcome and callers rebuild the response.

use crate::config::CacheConfig;
use bytes::Bytes;
use lru::LruCache;
use std::fmt;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::SystemTime;

/// Identifies one stored representation of a file.
///
/// The plain and gzip variants of the same path are distinct keys, so both
/// can be cached side by side.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    path: PathBuf,
    gzip: bool,
}

impl CacheKey {
    pub fn plain(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            gzip: false,
        }
    }

    pub fn gzip(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            gzip: true,
        }
    }

    pub fn new(path: impl Into<PathBuf>, gzip: bool) -> Self {
        if gzip {
            Self::gzip(path)
        } else {
            Self::plain(path)
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_gzip(&self) -> bool {
        self.gzip
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.gzip {
            write!(f, "{}+gzip", self.path.display())
        } else {
            write!(f, "{}", self.path.display())
        }
    }
}

/// A stored response. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub header: Bytes,
    pub body: Bytes,
    /// File mtime at build time, when known. Used for revalidation.
    pub modified: Option<SystemTime>,
}

impl CacheEntry {
    pub fn new(header: Bytes, body: Bytes) -> Self {
        Self {
            header,
            body,
            modified: None,
        }
    }

    pub fn with_modified(mut self, modified: Option<SystemTime>) -> Self {
        self.modified = modified;
        self
    }

    /// Bytes this entry counts against the cache budget.
    pub fn weight(&self) -> usize {
        self.header.len() + self.body.len()
    }
}

struct Inner {
    entries: LruCache<CacheKey, Arc<CacheEntry>>,
    weight: usize,
}

/// Thread-safe bounded response store shared by all workers.
pub struct ResponseCache {
    inner: Option<Mutex<Inner>>,
    max_bytes: usize,
}

impl ResponseCache {
    /// A `max_entries` of zero disables caching entirely.
    pub fn new(config: &CacheConfig) -> Self {
        let inner = NonZeroUsize::new(config.max_entries).map(|cap| {
            Mutex::new(Inner {
                entries: LruCache::new(cap),
                weight: 0,
            })
        });

        Self {
            inner,
            max_bytes: config.max_bytes,
        }
    }

    pub fn get(&self, key: &CacheKey) -> Option<Arc<CacheEntry>> {
        let mut inner = self.lock()?;
        inner.entries.get(key).cloned()
    }

    /// Stores `entry` under `key`, replacing any previous value.
    ///
    /// Entries larger than the whole byte budget are not kept. Returns whether
    /// the entry was stored.
    pub fn put(&self, key: CacheKey, entry: CacheEntry) -> bool {
        let weight = entry.weight();
        if weight > self.max_bytes {
            tracing::debug!(key = %key, weight, "Entry exceeds cache budget, not stored");
            return false;
        }

        let Some(mut inner) = self.lock() else {
            return false;
        };

        if let Some(old) = inner.entries.pop(&key) {
            inner.weight -= old.weight();
        }

        while inner.weight + weight > self.max_bytes {
            match inner.entries.pop_lru() {
                Some((evicted, old)) => {
                    inner.weight -= old.weight();
                    tracing::trace!(key = %evicted, "Evicted cache entry");
                }
                None => break,
            }
        }

        // Count-based eviction inside `push` must also release its weight.
        if let Some((evicted, old)) = inner.entries.push(key, Arc::new(entry)) {
            inner.weight -= old.weight();
            tracing::trace!(key = %evicted, "Evicted cache entry");
        }
        inner.weight += weight;

        true
    }

    /// Drops a single entry, if present.
    pub fn remove(&self, key: &CacheKey) {
        if let Some(mut inner) = self.lock() {
            if let Some(old) = inner.entries.pop(key) {
                inner.weight -= old.weight();
            }
        }
    }

    pub fn len(&self) -> usize {
        self.lock().map(|inner| inner.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total bytes currently held.
    pub fn weight(&self) -> usize {
        self.lock().map(|inner| inner.weight).unwrap_or(0)
    }

    fn lock(&self) -> Option<std::sync::MutexGuard<'_, Inner>> {
        self.inner
            .as_ref()
            .map(|m| m.lock().unwrap_or_else(PoisonError::into_inner))
    }
}
