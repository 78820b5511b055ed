//! LMDB-backed cache implementation.
//!
//! Uses the heed crate (Rust bindings for LMDB) to provide a memory-mapped
//! key-value store that survives process restarts.
//!
//! # Value Format
//!
//! Each value is laid out as:
//! - Bytes 0-7: `cached_at` as little-endian epoch milliseconds
//! - Bytes 8-15: `expires_at` as little-endian epoch milliseconds
//! - Bytes 16..: the JSON-encoded value
//!
//! Keys are the UTF-8 bytes of the cache key string.
//!
//! # Thread Safety
//!
//! LMDB provides ACID transactions. The backend uses read transactions for
//! `get`/`len` and write transactions for everything else, so check-then-
//! delete operations such as `remove_expired` are atomic.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};
use regex::Regex;
use sluice_core::CacheError;

use super::traits::{CacheBackend, CacheResult, CachedEntry};

const HEADER_LEN: usize = 16;

/// Error type for LMDB cache operations.
#[derive(Debug, thiserror::Error)]
pub enum LmdbCacheError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// Failed to open the database within the environment.
    #[error("Failed to open database: {0}")]
    DbOpen(String),

    /// Transaction error.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Stored bytes could not be decoded.
    #[error("Corrupt entry: {0}")]
    Corrupt(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl LmdbCacheError {
    fn during(operation: &str) -> impl Fn(heed::Error) -> CacheError + '_ {
        move |e| CacheError::Backend {
            operation: operation.to_string(),
            reason: LmdbCacheError::Transaction(e.to_string()).to_string(),
        }
    }
}

/// Convert LmdbCacheError to CacheError.
impl From<LmdbCacheError> for CacheError {
    fn from(e: LmdbCacheError) -> Self {
        CacheError::Backend {
            operation: "lmdb".to_string(),
            reason: e.to_string(),
        }
    }
}

/// LMDB-backed cache backend.
///
/// # Example
///
/// ```ignore
/// use sluice_storage::{CacheStore, LmdbCacheBackend};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// let backend = LmdbCacheBackend::new("/var/cache/sluice", 64)?;
/// let store = CacheStore::new(Arc::new(backend), Duration::from_secs(300));
/// ```
pub struct LmdbCacheBackend {
    /// The LMDB environment.
    env: Env,
    /// The main database (single unnamed database).
    db: Database<Bytes, Bytes>,
}

impl LmdbCacheBackend {
    /// Create a new LMDB cache backend.
    ///
    /// # Arguments
    ///
    /// * `path` - Directory where LMDB files will be stored
    /// * `max_size_mb` - Maximum size of the database in megabytes
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory cannot be created
    /// - LMDB environment cannot be opened
    /// - Database cannot be created
    pub fn new<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, LmdbCacheError> {
        std::fs::create_dir_all(&path)?;

        // SAFETY: the environment directory is owned by this backend and is
        // not opened twice within the process.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_size_mb * 1024 * 1024)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbCacheError::EnvOpen(e.to_string()))?;

        let mut wtxn = env
            .write_txn()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        let db: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| LmdbCacheError::DbOpen(e.to_string()))?;

        wtxn.commit()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        Ok(Self { env, db })
    }

    fn encode(key: &str, entry: &CachedEntry) -> CacheResult<Vec<u8>> {
        let json = serde_json::to_vec(&entry.value).map_err(|e| CacheError::Serialization {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        let mut bytes = Vec::with_capacity(HEADER_LEN + json.len());
        bytes.extend_from_slice(&entry.cached_at.timestamp_millis().to_le_bytes());
        bytes.extend_from_slice(&entry.expires_at.timestamp_millis().to_le_bytes());
        bytes.extend_from_slice(&json);
        Ok(bytes)
    }

    fn decode(key: &str, bytes: &[u8]) -> CacheResult<CachedEntry> {
        let corrupt = |reason: &str| CacheError::Deserialization {
            key: key.to_string(),
            reason: LmdbCacheError::Corrupt(reason.to_string()).to_string(),
        };
        if bytes.len() < HEADER_LEN {
            return Err(corrupt("entry shorter than header"));
        }
        let cached_at = Self::decode_millis(&bytes[0..8]).ok_or_else(|| corrupt("cached_at"))?;
        let expires_at = Self::decode_millis(&bytes[8..16]).ok_or_else(|| corrupt("expires_at"))?;
        let value = serde_json::from_slice(&bytes[HEADER_LEN..]).map_err(|e| {
            CacheError::Deserialization {
                key: key.to_string(),
                reason: e.to_string(),
            }
        })?;
        Ok(CachedEntry {
            value,
            cached_at,
            expires_at,
        })
    }

    fn decode_millis(bytes: &[u8]) -> Option<DateTime<Utc>> {
        let raw: [u8; 8] = bytes.try_into().ok()?;
        DateTime::from_timestamp_millis(i64::from_le_bytes(raw))
    }

    /// Expiry instant of a raw value without decoding its JSON body.
    fn expires_at(bytes: &[u8]) -> Option<DateTime<Utc>> {
        bytes.get(8..16).and_then(Self::decode_millis)
    }

    /// Collect the keys for which `select` returns true.
    fn collect_keys<F>(&self, mut select: F) -> CacheResult<Vec<Vec<u8>>>
    where
        F: FnMut(&[u8], &[u8]) -> bool,
    {
        let rtxn = self.env.read_txn().map_err(LmdbCacheError::during("scan"))?;
        let iter = self.db.iter(&rtxn).map_err(LmdbCacheError::during("scan"))?;

        let mut keys = Vec::new();
        for result in iter {
            match result {
                Ok((key, value)) => {
                    if select(key, value) {
                        keys.push(key.to_vec());
                    }
                }
                Err(_) => continue,
            }
        }
        Ok(keys)
    }

    fn delete_keys(&self, keys: &[Vec<u8>]) -> CacheResult<u64> {
        let mut wtxn = self.env.write_txn().map_err(LmdbCacheError::during("delete"))?;
        let mut deleted = 0u64;
        for key in keys {
            if self.db.delete(&mut wtxn, key).unwrap_or(false) {
                deleted += 1;
            }
        }
        wtxn.commit().map_err(LmdbCacheError::during("delete"))?;
        Ok(deleted)
    }
}

#[async_trait]
impl CacheBackend for LmdbCacheBackend {
    async fn get(&self, key: &str) -> CacheResult<Option<CachedEntry>> {
        let rtxn = self.env.read_txn().map_err(LmdbCacheError::during("get"))?;
        match self
            .db
            .get(&rtxn, key.as_bytes())
            .map_err(LmdbCacheError::during("get"))?
        {
            Some(bytes) => Self::decode(key, bytes).map(Some),
            None => Ok(None),
        }
    }

    async fn put(&self, key: &str, entry: CachedEntry) -> CacheResult<()> {
        let bytes = Self::encode(key, &entry)?;
        let mut wtxn = self.env.write_txn().map_err(LmdbCacheError::during("put"))?;
        self.db
            .put(&mut wtxn, key.as_bytes(), &bytes)
            .map_err(LmdbCacheError::during("put"))?;
        wtxn.commit().map_err(LmdbCacheError::during("put"))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        let mut wtxn = self.env.write_txn().map_err(LmdbCacheError::during("delete"))?;
        let deleted = self
            .db
            .delete(&mut wtxn, key.as_bytes())
            .map_err(LmdbCacheError::during("delete"))?;
        wtxn.commit().map_err(LmdbCacheError::during("delete"))?;
        Ok(deleted)
    }

    async fn remove_expired(&self, key: &str, now: DateTime<Utc>) -> CacheResult<bool> {
        let mut wtxn = self
            .env
            .write_txn()
            .map_err(LmdbCacheError::during("remove_expired"))?;
        let expired = match self
            .db
            .get(&wtxn, key.as_bytes())
            .map_err(LmdbCacheError::during("remove_expired"))?
        {
            // Undecodable headers are evicted along with expired entries
            Some(bytes) => Self::expires_at(bytes).map_or(true, |at| now >= at),
            None => false,
        };
        let removed = if expired {
            self.db
                .delete(&mut wtxn, key.as_bytes())
                .map_err(LmdbCacheError::during("remove_expired"))?
        } else {
            false
        };
        wtxn.commit()
            .map_err(LmdbCacheError::during("remove_expired"))?;
        Ok(removed)
    }

    async fn delete_matching(&self, pattern: &Regex) -> CacheResult<u64> {
        let keys = self.collect_keys(|key, _| {
            std::str::from_utf8(key).map_or(false, |k| pattern.is_match(k))
        })?;
        self.delete_keys(&keys)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> CacheResult<u64> {
        let keys = self.collect_keys(|_, value| Self::expires_at(value).map_or(true, |at| now >= at))?;
        self.delete_keys(&keys)
    }

    async fn clear(&self) -> CacheResult<()> {
        let mut wtxn = self.env.write_txn().map_err(LmdbCacheError::during("clear"))?;
        self.db
            .clear(&mut wtxn)
            .map_err(LmdbCacheError::during("clear"))?;
        wtxn.commit().map_err(LmdbCacheError::during("clear"))?;
        Ok(())
    }

    async fn len(&self) -> CacheResult<u64> {
        let rtxn = self.env.read_txn().map_err(LmdbCacheError::during("len"))?;
        self.db.len(&rtxn).map_err(LmdbCacheError::during("len"))
    }
}
