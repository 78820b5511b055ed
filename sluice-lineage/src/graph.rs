//! Lineage graph snapshot and its two-pass construction.
//!
//! Nodes live in an insertion-ordered arena and are referenced by index;
//! edges are stored once and indexed per node in both directions. A graph
//! is immutable after [`LineageGraph::build`] returns.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use sluice_core::{Dataflow, DatasetRef, EntityId, EntityKind, Timestamp};

/// Direction of data flow along an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeKind {
    /// Dataset feeds a dataflow.
    Input,
    /// Dataflow produces a dataset.
    Output,
}

impl EdgeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeKind::Input => "input",
            EdgeKind::Output => "output",
        }
    }
}

/// Attributes carried by dataflow nodes.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NodeMetadata {
    pub status: Option<String>,
    pub owner: Option<String>,
    pub enabled: Option<bool>,
    pub database_type: Option<String>,
    pub run_count: Option<u64>,
    pub input_count: usize,
    pub output_count: usize,
    pub last_run: Option<Timestamp>,
    pub created_at: Option<Timestamp>,
    pub modified_at: Option<Timestamp>,
}

impl NodeMetadata {
    fn from_dataflow(dataflow: &Dataflow) -> Self {
        Self {
            status: dataflow.status.clone(),
            owner: dataflow.owner.clone(),
            enabled: dataflow.enabled,
            database_type: dataflow.database_type.clone(),
            run_count: dataflow.run_count,
            input_count: dataflow.inputs.len(),
            output_count: dataflow.outputs.len(),
            last_run: dataflow.last_run,
            created_at: dataflow.created_at,
            modified_at: dataflow.modified_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineageNode {
    pub id: EntityId,
    pub name: String,
    pub kind: EntityKind,
    /// Present on dataflow nodes only; datasets are referenced, never fetched.
    pub metadata: Option<NodeMetadata>,
}

impl LineageNode {
    pub fn is_dataset(&self) -> bool {
        self.kind == EntityKind::Dataset
    }

    pub fn is_dataflow(&self) -> bool {
        self.kind == EntityKind::Dataflow
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LineageEdge {
    pub from: EntityId,
    pub to: EntityId,
    pub kind: EdgeKind,
}

/// One dataflow's reference to a dataset, as recorded in the reverse index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetUsage {
    pub dataflow_id: EntityId,
    pub role: EdgeKind,
}

/// Immutable snapshot of dataset/dataflow relationships.
#[derive(Debug, Clone, Default)]
pub struct LineageGraph {
    nodes: Vec<LineageNode>,
    index: HashMap<EntityId, usize>,
    edges: Vec<LineageEdge>,
    /// Edge indices leaving each node, by node index.
    outgoing: Vec<Vec<usize>>,
    /// Edge indices entering each node, by node index.
    incoming: Vec<Vec<usize>>,
    /// Dataset id -> every dataflow that consumes or produces it.
    dataset_usage: HashMap<EntityId, Vec<DatasetUsage>>,
}

/// References kept from pass one for edge creation in pass two.
struct AcceptedFlow<'a> {
    id: &'a str,
    inputs: Vec<&'a DatasetRef>,
    outputs: Vec<&'a DatasetRef>,
}

impl LineageGraph {
    /// Build a graph from a flat list of dataflows.
    ///
    /// Pass one adds every dataflow node and fills the reverse index. Pass
    /// two creates dataset nodes on first reference and only then adds the
    /// edge, so an edge never points at a missing node. Records without an
    /// id, repeated dataflow ids and references whose id is blank or names
    /// a dataflow are skipped with a warning.
    pub fn build(dataflows: &[Dataflow]) -> Self {
        let mut graph = Self::default();
        let mut accepted = Vec::with_capacity(dataflows.len());

        for (position, dataflow) in dataflows.iter().enumerate() {
            if dataflow.id.trim().is_empty() {
                tracing::warn!(position, name = %dataflow.name, "skipping dataflow without id");
                continue;
            }
            if graph.index.contains_key(&dataflow.id) {
                tracing::warn!(entity_id = %dataflow.id, "skipping repeated dataflow id");
                continue;
            }

            let inputs = usable_refs(&dataflow.id, &dataflow.inputs);
            let outputs = usable_refs(&dataflow.id, &dataflow.outputs);
            let name = if dataflow.name.is_empty() {
                dataflow.id.clone()
            } else {
                dataflow.name.clone()
            };
            graph.push_node(LineageNode {
                id: dataflow.id.clone(),
                name,
                kind: EntityKind::Dataflow,
                // Counts are filled in once colliding references are dropped
                metadata: Some(NodeMetadata::from_dataflow(dataflow)),
            });

            for (refs, role) in [(&inputs, EdgeKind::Input), (&outputs, EdgeKind::Output)] {
                for dataset in refs.iter() {
                    graph
                        .dataset_usage
                        .entry(dataset.id.clone())
                        .or_default()
                        .push(DatasetUsage {
                            dataflow_id: dataflow.id.clone(),
                            role,
                        });
                }
            }
            accepted.push(AcceptedFlow {
                id: &dataflow.id,
                inputs,
                outputs,
            });
        }

        // A dataset id that is also a dataflow id cannot become a node
        let collisions: HashSet<EntityId> = graph
            .dataset_usage
            .keys()
            .filter(|id| graph.index.contains_key(*id))
            .cloned()
            .collect();
        for id in &collisions {
            tracing::warn!(entity_id = %id, "dataset id collides with a dataflow id; dropping references");
            graph.dataset_usage.remove(id);
        }

        for flow in &mut accepted {
            if !collisions.is_empty() {
                flow.inputs.retain(|dataset| !collisions.contains(&dataset.id));
                flow.outputs.retain(|dataset| !collisions.contains(&dataset.id));
            }
            if let Some(&position) = graph.index.get(flow.id) {
                if let Some(metadata) = graph.nodes[position].metadata.as_mut() {
                    metadata.input_count = flow.inputs.len();
                    metadata.output_count = flow.outputs.len();
                }
            }
        }

        for flow in &accepted {
            for dataset in &flow.inputs {
                if graph.ensure_dataset(dataset) {
                    graph.push_edge(&dataset.id, flow.id, EdgeKind::Input);
                }
            }
            for dataset in &flow.outputs {
                if graph.ensure_dataset(dataset) {
                    graph.push_edge(flow.id, &dataset.id, EdgeKind::Output);
                }
            }
        }

        graph
    }

    fn push_node(&mut self, node: LineageNode) -> usize {
        let position = self.nodes.len();
        self.index.insert(node.id.clone(), position);
        self.nodes.push(node);
        self.outgoing.push(Vec::new());
        self.incoming.push(Vec::new());
        position
    }

    /// Add a dataset node on first reference. False if the id belongs to a
    /// node of another kind.
    fn ensure_dataset(&mut self, dataset: &DatasetRef) -> bool {
        if let Some(&position) = self.index.get(&dataset.id) {
            return self.nodes[position].is_dataset();
        }
        self.push_node(LineageNode {
            id: dataset.id.clone(),
            name: dataset.name.clone().unwrap_or_else(|| dataset.id.clone()),
            kind: EntityKind::Dataset,
            metadata: None,
        });
        true
    }

    fn push_edge(&mut self, from: &str, to: &str, kind: EdgeKind) {
        let (Some(&source), Some(&target)) = (self.index.get(from), self.index.get(to)) else {
            return;
        };
        let position = self.edges.len();
        self.edges.push(LineageEdge {
            from: from.to_string(),
            to: to.to_string(),
            kind,
        });
        self.outgoing[source].push(position);
        self.incoming[target].push(position);
    }

    // ========================================================================
    // ACCESSORS
    // ========================================================================

    /// Nodes in insertion order.
    pub fn nodes(&self) -> &[LineageNode] {
        &self.nodes
    }

    pub fn edges(&self) -> &[LineageEdge] {
        &self.edges
    }

    pub fn node(&self, id: &str) -> Option<&LineageNode> {
        self.index.get(id).map(|&position| &self.nodes[position])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Dataflows that consume or produce `dataset_id`.
    pub fn dataset_usage(&self, dataset_id: &str) -> &[DatasetUsage] {
        self.dataset_usage
            .get(dataset_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub(crate) fn position(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub(crate) fn node_at(&self, position: usize) -> &LineageNode {
        &self.nodes[position]
    }

    pub(crate) fn edge_at(&self, position: usize) -> &LineageEdge {
        &self.edges[position]
    }

    /// Edge indices leaving the node at `position`.
    pub(crate) fn outgoing_at(&self, position: usize) -> &[usize] {
        &self.outgoing[position]
    }

    /// Edge indices entering the node at `position`.
    pub(crate) fn incoming_at(&self, position: usize) -> &[usize] {
        &self.incoming[position]
    }

    /// Ids of the datasets attached to dataflow `id` by edges of `kind`.
    pub(crate) fn datasets_of(&self, id: &str, kind: EdgeKind) -> Vec<&str> {
        let Some(position) = self.position(id) else {
            return Vec::new();
        };
        match kind {
            EdgeKind::Input => self.incoming[position]
                .iter()
                .map(|&edge| self.edges[edge].from.as_str())
                .collect(),
            EdgeKind::Output => self.outgoing[position]
                .iter()
                .map(|&edge| self.edges[edge].to.as_str())
                .collect(),
        }
    }
}

/// Drop blank and repeated references of one dataflow.
fn usable_refs<'a>(dataflow_id: &str, refs: &'a [DatasetRef]) -> Vec<&'a DatasetRef> {
    let mut seen = HashSet::new();
    refs.iter()
        .filter(|dataset| {
            if dataset.id.trim().is_empty() {
                tracing::warn!(entity_id = dataflow_id, "skipping dataset reference without id");
                return false;
            }
            seen.insert(dataset.id.as_str())
        })
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================
