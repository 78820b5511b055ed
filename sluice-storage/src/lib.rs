//! Sluice Storage - TTL cache store and backends
//!
//! Holds the process-wide entity cache. The entity managers in
//! `sluice-client` share one [`CacheStore`] handle.

pub mod cache;

pub use cache::{
    CacheBackend, CacheKey, CacheRead, CacheResult, CacheStats, CacheStore, CachedEntry, Clock,
    InMemoryCacheBackend, LmdbCacheBackend, LmdbCacheError, ManualClock, ReadOrigin, SystemClock,
    DEFAULT_TTL, DUAL_PREFIX,
};
