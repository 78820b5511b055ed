//! Entity records
//!
//! Explicit, typed views of the remote entities. Raw payloads are mapped
//! onto these by the functions in [`crate::payload`]; anything the mapping
//! does not name is dropped.

use crate::{EntityId, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Reference from a dataflow to one of its input or output datasets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct DatasetRef {
    pub id: EntityId,
    pub name: Option<String>,
}

impl DatasetRef {
    pub fn new(id: impl Into<EntityId>) -> Self {
        Self {
            id: id.into(),
            name: None,
        }
    }

    pub fn named(id: impl Into<EntityId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: Some(name.into()),
        }
    }
}

/// One event that can start a dataflow run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct TriggerEvent {
    /// Event type as reported upstream (e.g. `DATASET_UPDATED`, `SCHEDULE`).
    pub kind: String,
    pub dataset_id: Option<EntityId>,
    pub schedule: Option<String>,
}

/// A trigger groups events with the conditions that gate them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Trigger {
    pub title: Option<String>,
    pub events: Vec<TriggerEvent>,
    pub conditions: Vec<String>,
}

/// Trigger and schedule configuration (enhanced representation only).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct TriggerSettings {
    pub triggers: Vec<Trigger>,
    pub zone_id: Option<String>,
    pub locale: Option<String>,
}

/// Position of one step on the dataflow editor canvas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct LayoutNode {
    pub id: String,
    pub x: f64,
    pub y: f64,
}

/// Visual graph structure of the dataflow editor (enhanced representation only).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct GraphLayout {
    pub nodes: Vec<LayoutNode>,
}

/// A transformation step definition (enhanced representation only).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct TransformAction {
    pub id: String,
    pub kind: String,
    pub name: Option<String>,
    pub depends_on: Vec<String>,
}

/// A dataflow as seen through either API representation, or both merged.
///
/// Fields below `modified_at` are only ever populated by the enhanced
/// representation.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Dataflow {
    pub id: EntityId,
    pub name: String,
    pub description: Option<String>,
    pub owner: Option<String>,
    /// Last execution state (e.g. `SUCCESS`, `FAILED`, `RUNNING`).
    pub status: Option<String>,
    pub enabled: Option<bool>,
    pub database_type: Option<String>,
    pub inputs: Vec<DatasetRef>,
    pub outputs: Vec<DatasetRef>,
    pub run_count: Option<u64>,
    pub last_run: Option<Timestamp>,
    pub created_at: Option<Timestamp>,
    pub modified_at: Option<Timestamp>,

    pub trigger_settings: Option<TriggerSettings>,
    pub engine_properties: BTreeMap<String, String>,
    pub graph: Option<GraphLayout>,
    pub actions: Vec<TransformAction>,
}

impl Dataflow {
    /// Create a dataflow with only its identity set.
    pub fn new(id: impl Into<EntityId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_input(mut self, dataset: DatasetRef) -> Self {
        self.inputs.push(dataset);
        self
    }

    pub fn with_output(mut self, dataset: DatasetRef) -> Self {
        self.outputs.push(dataset);
        self
    }
}

/// Sort direction for search listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

/// Sort specification for search listings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct SearchSort {
    pub field: String,
    pub order: SortOrder,
}

impl SearchSort {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            order: SortOrder::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            order: SortOrder::Desc,
        }
    }
}

/// Parameters of one search page request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct SearchParams {
    pub query: String,
    pub limit: usize,
    pub offset: usize,
    pub sort: Option<SearchSort>,
}

impl SearchParams {
    pub fn new(query: impl Into<String>, limit: usize, offset: usize) -> Self {
        Self {
            query: query.into(),
            limit,
            offset,
            sort: None,
        }
    }

    pub fn sorted(mut self, sort: SearchSort) -> Self {
        self.sort = Some(sort);
        self
    }
}

/// One page of search results.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct SearchPage {
    pub items: Vec<Dataflow>,
    /// Total number of matches upstream, when the API reports it.
    pub total: Option<u64>,
    /// Records the API returned for this page, including any that could
    /// not be mapped into `items`. Paging advances by this count.
    #[serde(default)]
    pub fetched: usize,
}

/// Changes applied by an update mutation. Unset fields are left untouched.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct DataflowUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub enabled: Option<bool>,
    pub owner: Option<String>,
}

impl DataflowUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.enabled.is_none()
            && self.owner.is_none()
    }
}

/// A dataflow run started by an execute action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Execution {
    pub id: String,
    pub dataflow_id: EntityId,
    pub state: String,
    pub started_at: Option<Timestamp>,
    pub ended_at: Option<Timestamp>,
}
