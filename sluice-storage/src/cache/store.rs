//! Best-effort TTL cache store.
//!
//! [`CacheStore`] wraps a [`CacheBackend`] with expiry, statistics and
//! failure isolation. It is constructed once at process start and shared
//! by handle (it is cheap to clone) with every entity manager.
//!
//! The store never fails its caller: a backend error on a read is logged and
//! reported as a miss, and a backend error on a write or invalidation is
//! logged and dropped. The source of truth is always one fetch away.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use sluice_core::{CacheBackendKind, CacheError, CacheSettings, SluiceResult};
use tokio::task::JoinHandle;

use super::clock::{Clock, SystemClock};
use super::read::CacheRead;
use super::key::CacheKey;
use super::lmdb_backend::LmdbCacheBackend;
use super::memory::InMemoryCacheBackend;
use super::traits::{CacheBackend, CacheStats, CachedEntry};

/// Default TTL when none is configured.
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Shared, best-effort key/value cache with per-entry expiry.
#[derive(Clone)]
pub struct CacheStore {
    backend: Arc<dyn CacheBackend>,
    clock: Arc<dyn Clock>,
    default_ttl: Duration,
    stats: Arc<RwLock<CacheStats>>,
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore")
            .field("default_ttl", &self.default_ttl)
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

impl CacheStore {
    /// Create a store over `backend` using the wall clock.
    pub fn new(backend: Arc<dyn CacheBackend>, default_ttl: Duration) -> Self {
        Self::with_clock(backend, default_ttl, Arc::new(SystemClock))
    }

    /// Create a store with an explicit time source.
    pub fn with_clock(
        backend: Arc<dyn CacheBackend>,
        default_ttl: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            backend,
            clock,
            default_ttl,
            stats: Arc::new(RwLock::new(CacheStats::default())),
        }
    }

    /// Create an in-memory store with the default TTL.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryCacheBackend::new()), DEFAULT_TTL)
    }

    /// Build the store described by `settings`.
    ///
    /// Opening a persistent backend is the one place the cache may fail, and
    /// it only happens at startup.
    pub fn from_settings(settings: &CacheSettings) -> SluiceResult<Self> {
        let backend: Arc<dyn CacheBackend> = match &settings.backend {
            CacheBackendKind::Memory => Arc::new(InMemoryCacheBackend::new()),
            CacheBackendKind::Lmdb { path, max_size_mb } => {
                let backend = LmdbCacheBackend::new(path, *max_size_mb)
                    .map_err(CacheError::from)?;
                tracing::info!(path = %path.display(), max_size_mb, "opened LMDB cache backend");
                Arc::new(backend)
            }
        };
        Ok(Self::new(backend, settings.default_ttl))
    }

    /// Deterministic key for a namespace and parameter mapping.
    pub fn generate_key<I, K, V>(namespace: &str, params: I) -> CacheKey
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        CacheKey::generate(namespace, params)
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    // ========================================================================
    // READS
    // ========================================================================

    /// Get the live entry for `key`, evicting it if it has expired.
    pub async fn get_entry(&self, key: &str) -> Option<CachedEntry> {
        let entry = match self.backend.get(key).await {
            Ok(entry) => entry,
            Err(e) => {
                self.record_failure("get", key, &e);
                self.bump(|s| s.misses += 1);
                return None;
            }
        };

        let Some(entry) = entry else {
            tracing::debug!(key, "cache miss");
            self.bump(|s| s.misses += 1);
            return None;
        };

        let now = self.clock.now();
        if entry.is_expired(now) {
            match self.backend.remove_expired(key, now).await {
                Ok(true) => self.bump(|s| s.expirations += 1),
                Ok(false) => {}
                Err(e) => self.record_failure("remove_expired", key, &e),
            }
            tracing::debug!(key, "cache entry expired");
            self.bump(|s| s.misses += 1);
            return None;
        }

        tracing::debug!(key, "cache hit");
        self.bump(|s| s.hits += 1);
        Some(entry)
    }

    /// Get the value for `key`, or `None` on a miss.
    pub async fn get(&self, key: &str) -> Option<Value> {
        self.get_entry(key).await.map(|entry| entry.value)
    }

    /// Get and deserialize the value for `key`.
    ///
    /// A value that no longer deserializes as `T` is logged and treated as a
    /// miss.
    pub async fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get_read(key).await.map(CacheRead::into_value)
    }

    /// Like [`get_as`](Self::get_as), keeping the cache timing metadata.
    pub async fn get_read<T: DeserializeOwned>(&self, key: &str) -> Option<CacheRead<T>> {
        let entry = self.get_entry(key).await?;
        match serde_json::from_value::<T>(entry.value) {
            Ok(value) => Some(CacheRead::from_cache(
                value,
                entry.cached_at,
                entry.expires_at,
            )),
            Err(e) => {
                let err = CacheError::Deserialization {
                    key: key.to_string(),
                    reason: e.to_string(),
                };
                self.record_failure("decode", key, &err);
                None
            }
        }
    }

    // ========================================================================
    // WRITES
    // ========================================================================

    /// Store `value` under `key` for `ttl` (or the default TTL).
    pub async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) {
        let ttl = ttl.unwrap_or(self.default_ttl);
        let now = self.clock.now();
        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|delta| now.checked_add_signed(delta))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        let entry = CachedEntry {
            value,
            cached_at: now,
            expires_at,
        };
        if let Err(e) = self.backend.put(key, entry).await {
            self.record_failure("set", key, &e);
        }
    }

    /// Serialize and store `value`.
    pub async fn set_as<T: Serialize>(&self, key: &str, value: &T, ttl: Option<Duration>) {
        match serde_json::to_value(value) {
            Ok(json) => self.set(key, json, ttl).await,
            Err(e) => {
                let err = CacheError::Serialization {
                    key: key.to_string(),
                    reason: e.to_string(),
                };
                self.record_failure("encode", key, &err);
            }
        }
    }

    // ========================================================================
    // INVALIDATION
    // ========================================================================

    /// Remove one entry. No-op if absent.
    pub async fn invalidate(&self, key: &str) {
        match self.backend.delete(key).await {
            Ok(true) => {
                tracing::debug!(key, "invalidated cache entry");
                self.bump(|s| s.invalidations += 1);
            }
            Ok(false) => {}
            Err(e) => self.record_failure("invalidate", key, &e),
        }
    }

    /// Remove every entry whose key matches `pattern`. Returns the count removed.
    pub async fn invalidate_pattern(&self, pattern: &Regex) -> u64 {
        match self.backend.delete_matching(pattern).await {
            Ok(removed) => {
                tracing::debug!(pattern = %pattern, removed, "invalidated cache entries by pattern");
                self.bump(|s| s.invalidations += removed);
                removed
            }
            Err(e) => {
                self.record_failure("invalidate_pattern", pattern.as_str(), &e);
                0
            }
        }
    }

    /// Drop every expired entry. Returns the count removed.
    pub async fn purge_expired(&self) -> u64 {
        match self.backend.purge_expired(self.clock.now()).await {
            Ok(removed) => {
                if removed > 0 {
                    tracing::debug!(removed, "purged expired cache entries");
                }
                self.bump(|s| s.expirations += removed);
                removed
            }
            Err(e) => {
                self.record_failure("purge_expired", "*", &e);
                0
            }
        }
    }

    /// Clear all entries and statistics. Intended for test isolation.
    pub async fn reset(&self) {
        if let Err(e) = self.backend.clear().await {
            self.record_failure("reset", "*", &e);
        }
        if let Ok(mut stats) = self.stats.write() {
            *stats = CacheStats::default();
        }
    }

    /// Spawn a background task purging expired entries every `interval`.
    ///
    /// The sweep only bounds memory held by entries nobody reads again;
    /// reads check expiry on their own. Abort the handle to stop it.
    pub fn spawn_sweeper(&self, interval: Duration) -> JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                store.purge_expired().await;
            }
        })
    }

    /// Start the sweeper when `settings.sweep_interval` is set. Must be
    /// called from within a tokio runtime.
    pub fn start_configured_sweeper(&self, settings: &CacheSettings) -> Option<JoinHandle<()>> {
        let interval = settings.sweep_interval?;
        tracing::debug!(interval_secs = interval.as_secs(), "starting cache sweeper");
        Some(self.spawn_sweeper(interval))
    }

    // ========================================================================
    // STATISTICS
    // ========================================================================

    /// Snapshot of usage counters plus the current entry count.
    ///
    /// The backend is asked for its size first, so a failure there is
    /// already counted in the returned snapshot.
    pub async fn stats(&self) -> CacheStats {
        let entry_count = match self.backend.len().await {
            Ok(len) => len,
            Err(e) => {
                self.record_failure("len", "*", &e);
                0
            }
        };
        let mut snapshot = self
            .stats
            .read()
            .map(|stats| stats.clone())
            .unwrap_or_default();
        snapshot.entry_count = entry_count;
        snapshot
    }

    fn bump(&self, update: impl FnOnce(&mut CacheStats)) {
        if let Ok(mut stats) = self.stats.write() {
            update(&mut stats);
        }
    }

    fn record_failure(&self, operation: &str, key: &str, error: &CacheError) {
        tracing::warn!(operation, key, error = %error, "cache operation failed; continuing without cache");
        self.bump(|s| s.failures += 1);
    }
}

// ============================================================================
// TESTS
// ============================================================================
