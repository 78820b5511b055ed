//! Cache backend trait and entry types.
//!
//! This module defines the trait that cache backends implement and the
//! entry shape they store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde_json::Value;
use sluice_core::CacheError;

/// Result type for backend operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// One stored value with its timing metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedEntry {
    pub value: Value,
    pub cached_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl CachedEntry {
    /// True once `now` has reached the expiry instant.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Cache backend trait for pluggable cache implementations.
///
/// Backends store entries verbatim and never interpret expiry on reads;
/// the store decides what is stale. Implementations must be safe under
/// concurrent callers.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Get the entry for `key`, expired or not.
    async fn get(&self, key: &str) -> CacheResult<Option<CachedEntry>>;

    /// Store `entry` under `key`, replacing any previous entry.
    async fn put(&self, key: &str, entry: CachedEntry) -> CacheResult<()>;

    /// Remove `key`. Returns whether an entry was removed.
    async fn delete(&self, key: &str) -> CacheResult<bool>;

    /// Remove `key` only if its entry is expired at `now`.
    ///
    /// The check and removal are atomic so a fresh entry written by a
    /// concurrent caller is never evicted by a stale read.
    async fn remove_expired(&self, key: &str, now: DateTime<Utc>) -> CacheResult<bool>;

    /// Remove every entry whose key matches `pattern`. Returns the count removed.
    async fn delete_matching(&self, pattern: &Regex) -> CacheResult<u64>;

    /// Remove every entry expired at `now`. Returns the count removed.
    async fn purge_expired(&self, now: DateTime<Utc>) -> CacheResult<u64>;

    /// Remove everything.
    async fn clear(&self) -> CacheResult<()>;

    /// Number of stored entries, expired ones included.
    async fn len(&self) -> CacheResult<u64>;
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses (absent or expired).
    pub misses: u64,
    /// Number of entries evicted because they had expired.
    pub expirations: u64,
    /// Number of entries removed by explicit invalidation.
    pub invalidations: u64,
    /// Number of backend failures swallowed as misses or no-ops.
    pub failures: u64,
    /// Number of entries currently stored.
    pub entry_count: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
