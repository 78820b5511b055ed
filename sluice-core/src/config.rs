//! Configuration types

use crate::*;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Which cache backend the store is built on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CacheBackendKind {
    /// Process-local map, lost on shutdown
    Memory,
    /// Memory-mapped LMDB environment at `path`
    Lmdb { path: PathBuf, max_size_mb: usize },
}

/// Cache store settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSettings {
    /// TTL applied by `set` when the caller gives none.
    pub default_ttl: Duration,
    /// TTL for merged single-entity responses (`dual:<kind>:<id>`).
    pub entity_ttl: Duration,
    /// TTL for search listing pages.
    pub search_ttl: Duration,
    /// Interval of the best-effort expiry sweep; `None` disables it.
    pub sweep_interval: Option<Duration>,
    pub backend: CacheBackendKind,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(300),
            entity_ttl: Duration::from_secs(300),
            search_ttl: Duration::from_secs(300),
            sweep_interval: None,
            backend: CacheBackendKind::Memory,
        }
    }
}

/// Lineage engine settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineageSettings {
    /// Node budget for Mermaid output when the caller does not pick one.
    pub default_mermaid_max_nodes: usize,
    /// Upper bound on hops per traced path; `None` explores every simple path.
    pub max_trace_depth: Option<usize>,
}

impl Default for LineageSettings {
    fn default() -> Self {
        Self {
            default_mermaid_max_nodes: 50,
            max_trace_depth: None,
        }
    }
}

/// Master configuration struct.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SluiceConfig {
    pub cache: CacheSettings,
    pub lineage: LineageSettings,
}

impl SluiceConfig {
    /// Create from environment variables with fallback to defaults.
    ///
    /// Environment variables:
    /// - `SLUICE_CACHE_DEFAULT_TTL_SECS`: default TTL (default: 300)
    /// - `SLUICE_CACHE_ENTITY_TTL_SECS`: merged entity TTL (default: 300)
    /// - `SLUICE_CACHE_SEARCH_TTL_SECS`: search page TTL (default: 300)
    /// - `SLUICE_CACHE_SWEEP_INTERVAL_SECS`: enables the expiry sweep when set
    /// - `SLUICE_CACHE_LMDB_PATH`: switches to the LMDB backend when set
    /// - `SLUICE_CACHE_LMDB_MAX_SIZE_MB`: LMDB map size (default: 64)
    /// - `SLUICE_LINEAGE_MERMAID_MAX_NODES`: Mermaid node budget (default: 50)
    /// - `SLUICE_LINEAGE_MAX_TRACE_DEPTH`: bound on traced path length
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let backend = match std::env::var("SLUICE_CACHE_LMDB_PATH") {
            Ok(path) => CacheBackendKind::Lmdb {
                path: PathBuf::from(path),
                max_size_mb: env_parse("SLUICE_CACHE_LMDB_MAX_SIZE_MB").unwrap_or(64),
            },
            Err(_) => defaults.cache.backend.clone(),
        };

        Self {
            cache: CacheSettings {
                default_ttl: env_secs("SLUICE_CACHE_DEFAULT_TTL_SECS")
                    .unwrap_or(defaults.cache.default_ttl),
                entity_ttl: env_secs("SLUICE_CACHE_ENTITY_TTL_SECS")
                    .unwrap_or(defaults.cache.entity_ttl),
                search_ttl: env_secs("SLUICE_CACHE_SEARCH_TTL_SECS")
                    .unwrap_or(defaults.cache.search_ttl),
                sweep_interval: env_secs("SLUICE_CACHE_SWEEP_INTERVAL_SECS"),
                backend,
            },
            lineage: LineageSettings {
                default_mermaid_max_nodes: env_parse("SLUICE_LINEAGE_MERMAID_MAX_NODES")
                    .unwrap_or(defaults.lineage.default_mermaid_max_nodes),
                max_trace_depth: env_parse("SLUICE_LINEAGE_MAX_TRACE_DEPTH"),
            },
        }
    }

    /// Validate the configuration.
    /// Returns Ok(()) if valid, Err(SluiceError::Config) if invalid.
    pub fn validate(&self) -> SluiceResult<()> {
        let ttls = [
            ("cache.default_ttl", self.cache.default_ttl),
            ("cache.entity_ttl", self.cache.entity_ttl),
            ("cache.search_ttl", self.cache.search_ttl),
        ];
        for (field, ttl) in ttls {
            if ttl.is_zero() {
                return Err(SluiceError::Config(ConfigError::InvalidValue {
                    field: field.to_string(),
                    value: format!("{:?}", ttl),
                    reason: "TTL must be positive".to_string(),
                }));
            }
        }

        if let Some(interval) = self.cache.sweep_interval {
            if interval.is_zero() {
                return Err(SluiceError::Config(ConfigError::InvalidValue {
                    field: "cache.sweep_interval".to_string(),
                    value: format!("{:?}", interval),
                    reason: "sweep_interval must be positive when set".to_string(),
                }));
            }
        }

        if let CacheBackendKind::Lmdb { path, max_size_mb } = &self.cache.backend {
            if path.as_os_str().is_empty() {
                return Err(SluiceError::Config(ConfigError::MissingRequired {
                    field: "cache.backend.path".to_string(),
                }));
            }
            if *max_size_mb == 0 {
                return Err(SluiceError::Config(ConfigError::InvalidValue {
                    field: "cache.backend.max_size_mb".to_string(),
                    value: max_size_mb.to_string(),
                    reason: "max_size_mb must be greater than 0".to_string(),
                }));
            }
        }

        if self.lineage.default_mermaid_max_nodes == 0 {
            return Err(SluiceError::Config(ConfigError::InvalidValue {
                field: "lineage.default_mermaid_max_nodes".to_string(),
                value: "0".to_string(),
                reason: "default_mermaid_max_nodes must be greater than 0".to_string(),
            }));
        }

        if self.lineage.max_trace_depth == Some(0) {
            return Err(SluiceError::Config(ConfigError::InvalidValue {
                field: "lineage.max_trace_depth".to_string(),
                value: "0".to_string(),
                reason: "max_trace_depth must be greater than 0 when set".to_string(),
            }));
        }

        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.parse().ok())
}

fn env_secs(name: &str) -> Option<Duration> {
    env_parse::<u64>(name).map(Duration::from_secs)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = SluiceConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.cache.default_ttl, Duration::from_secs(300));
        assert_eq!(config.cache.backend, CacheBackendKind::Memory);
        assert_eq!(config.lineage.default_mermaid_max_nodes, 50);
    }

    #[test]
    fn test_zero_ttl_rejected() {
        let mut config = SluiceConfig::default();
        config.cache.search_ttl = Duration::ZERO;
        match config.validate() {
            Err(SluiceError::Config(ConfigError::InvalidValue { field, .. })) => {
                assert_eq!(field, "cache.search_ttl");
            }
            other => panic!("expected invalid search_ttl, got {:?}", other),
        }
    }

    #[test]
    fn test_zero_sweep_interval_rejected() {
        let mut config = SluiceConfig::default();
        config.cache.sweep_interval = Some(Duration::ZERO);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_lmdb_backend_requires_path() {
        let mut config = SluiceConfig::default();
        config.cache.backend = CacheBackendKind::Lmdb {
            path: PathBuf::new(),
            max_size_mb: 16,
        };
        assert!(matches!(
            config.validate(),
            Err(SluiceError::Config(ConfigError::MissingRequired { .. }))
        ));
    }

    #[test]
    fn test_zero_mermaid_budget_rejected() {
        let mut config = SluiceConfig::default();
        config.lineage.default_mermaid_max_nodes = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_serde_roundtrip_keeps_backend() {
        let mut config = SluiceConfig::default();
        config.cache.backend = CacheBackendKind::Lmdb {
            path: PathBuf::from("/var/cache/sluice"),
            max_size_mb: 128,
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: SluiceConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
