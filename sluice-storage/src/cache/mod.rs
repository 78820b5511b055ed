//! Cache layer for entity payloads.
//!
//! Entries are JSON values stored under string keys with a per-entry expiry
//! instant. The [`CacheStore`] is best-effort by contract: backend failures
//! surface as misses and log lines, never as errors to the caller.
//!
//! # Keys
//!
//! Parameterized queries are keyed with [`CacheKey::generate`], which sorts
//! the parameters and drops nulls, so two logically identical requests share
//! one entry regardless of argument order. Single entities use
//! [`CacheKey::dual`], which keeps the `dual:<kind>:<id>` shape stable for
//! exact invalidation.
//!
//! # Example
//!
//! ```ignore
//! let store = CacheStore::in_memory();
//! let key = CacheKey::generate("dataflow-search", [("query", json!("sales"))]);
//! store.set(key.as_str(), json!([]), None).await;
//! store.invalidate_pattern(&Regex::new("^dataflow-search")?).await;
//! ```

pub mod clock;
pub mod key;
pub mod lmdb_backend;
pub mod memory;
pub mod read;
pub mod store;
pub mod traits;

pub use clock::{Clock, ManualClock, SystemClock};
pub use key::{CacheKey, DUAL_PREFIX};
pub use lmdb_backend::{LmdbCacheBackend, LmdbCacheError};
pub use memory::InMemoryCacheBackend;
pub use read::{CacheRead, ReadOrigin};
pub use store::{CacheStore, DEFAULT_TTL};
pub use traits::{CacheBackend, CacheResult, CacheStats, CachedEntry};
