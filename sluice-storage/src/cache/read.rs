//! Where a cache-or-fetch read was answered from.

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Origin of a value handed back by a read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOrigin {
    /// Served from a live cache entry.
    Cache {
        cached_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    },
    /// Fetched from the remote API on this call.
    Source { fetched_at: DateTime<Utc> },
}

/// A value plus the [`ReadOrigin`] it was answered from.
///
/// Managers return this from their `*_read` methods so callers can report
/// whether a dataflow or search page came from cache, and how long the entry
/// still has to live.
#[derive(Debug, Clone)]
pub struct CacheRead<T> {
    value: T,
    origin: ReadOrigin,
}

impl<T> CacheRead<T> {
    pub fn from_cache(value: T, cached_at: DateTime<Utc>, expires_at: DateTime<Utc>) -> Self {
        Self {
            value,
            origin: ReadOrigin::Cache {
                cached_at,
                expires_at,
            },
        }
    }

    pub fn from_source(value: T, fetched_at: DateTime<Utc>) -> Self {
        Self {
            value,
            origin: ReadOrigin::Source { fetched_at },
        }
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn into_value(self) -> T {
        self.value
    }

    pub fn origin(&self) -> ReadOrigin {
        self.origin
    }

    pub fn was_cache_hit(&self) -> bool {
        matches!(self.origin, ReadOrigin::Cache { .. })
    }

    pub fn was_cache_miss(&self) -> bool {
        !self.was_cache_hit()
    }

    /// When the value left the remote API, whether just now or when it was
    /// first cached.
    pub fn observed_at(&self) -> DateTime<Utc> {
        match self.origin {
            ReadOrigin::Cache { cached_at, .. } => cached_at,
            ReadOrigin::Source { fetched_at } => fetched_at,
        }
    }

    /// Time left before the serving entry expires. `None` for fresh fetches.
    pub fn expires_in(&self, now: DateTime<Utc>) -> Option<Duration> {
        match self.origin {
            ReadOrigin::Cache { expires_at, .. } => {
                Some((expires_at - now).to_std().unwrap_or(Duration::ZERO))
            }
            ReadOrigin::Source { .. } => None,
        }
    }
}
