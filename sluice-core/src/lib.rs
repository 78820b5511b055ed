//! Sluice Core - Entity Types
//!
//! Pure data structures shared by the cache, client and lineage crates:
//! identity types, the error taxonomy, configuration, typed dataflow
//! records with their payload mapping, and the dual-response merger.
//! No I/O happens here.

pub mod config;
pub mod dual;
pub mod entities;
pub mod error;
pub mod identity;
pub mod payload;

pub use config::{CacheBackendKind, CacheSettings, LineageSettings, SluiceConfig};
pub use dual::{merge, DualResponse, FormattedDual, Mergeable};
pub use entities::{
    DatasetRef, Dataflow, DataflowUpdate, Execution, GraphLayout, LayoutNode, SearchPage,
    SearchParams, SearchSort, SortOrder, TransformAction, Trigger, TriggerEvent, TriggerSettings,
};
pub use error::{
    CacheError, ConfigError, FetchError, SluiceError, SluiceResult, ValidationError,
};
pub use identity::{EntityId, EntityKind, Timestamp};
pub use payload::{
    dataflow_from_primary, dataflow_from_secondary, execution_from_payload,
    search_page_from_payload, PayloadError,
};
