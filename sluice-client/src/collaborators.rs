//! Collaborator traits for the remote API layer.
//!
//! The transport, authentication and pagination details live outside this
//! crate. Managers only see raw JSON payloads and `SluiceResult`s; any
//! error a collaborator returns is propagated to the caller unchanged.

use async_trait::async_trait;
use serde_json::Value;
use sluice_core::{DataflowUpdate, EntityKind, SearchParams, SluiceResult};

/// Fetches one page of dataflow search results.
#[async_trait]
pub trait DataflowSearcher: Send + Sync {
    /// Run a search and return the raw page payload.
    async fn search(&self, params: &SearchParams) -> SluiceResult<Value>;
}

/// Fetches a single entity from one API surface.
///
/// A manager holds one fetcher for the primary representation and may hold
/// a second for the enhanced (secondary) representation.
#[async_trait]
pub trait EntityFetcher: Send + Sync {
    async fn fetch(&self, kind: EntityKind, id: &str) -> SluiceResult<Value>;
}

/// Applies state-changing operations to dataflows.
#[async_trait]
pub trait DataflowMutator: Send + Sync {
    /// Apply `changes` and return the updated record payload.
    async fn update(&self, id: &str, changes: &DataflowUpdate) -> SluiceResult<Value>;

    /// Start a run and return the execution payload.
    async fn execute(&self, id: &str) -> SluiceResult<Value>;
}
