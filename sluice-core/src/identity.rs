//! Identity types for sluice entities

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Remote entity identifier.
/// The upstream API hands out opaque ids (numeric for dataflows, UUID-shaped
/// for datasets); they are never parsed, only compared and hashed.
pub type EntityId = String;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Entity kind discriminator used in cache keys and log fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Dataflow,
    Dataset,
}

impl EntityKind {
    /// Lowercase name used as a cache namespace segment.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Dataflow => "dataflow",
            EntityKind::Dataset => "dataset",
        }
    }

    /// Namespace for cached search listings of this kind (`<kind>-search`).
    pub fn search_namespace(&self) -> String {
        format!("{}-search", self.as_str())
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
