//! Renderer-facing views of a lineage graph.

use std::collections::HashMap;
use std::fmt::Write as _;

use serde::Serialize;
use sluice_core::{EntityKind, EntityId};

use crate::graph::{EdgeKind, LineageGraph, NodeMetadata};

/// Flat node/link lists for external graph renderers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VisualizationExport {
    pub nodes: Vec<VisualNode>,
    pub links: Vec<VisualLink>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VisualNode {
    pub id: EntityId,
    pub name: String,
    pub kind: EntityKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<NodeMetadata>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VisualLink {
    pub source: EntityId,
    pub target: EntityId,
    pub kind: EdgeKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct GraphStatistics {
    pub dataflow_count: usize,
    pub dataset_count: usize,
    pub input_edge_count: usize,
    pub output_edge_count: usize,
    /// Datasets no dataflow produces.
    pub source_datasets: Vec<EntityId>,
    /// Datasets no dataflow consumes.
    pub sink_datasets: Vec<EntityId>,
}

const DATAFLOW_CLASS: &str = "classDef dataflow fill:#e3f2fd,stroke:#1565c0,color:#0d47a1";
const DATASET_CLASS: &str = "classDef dataset fill:#f1f8e9,stroke:#558b2f,color:#33691e";

impl LineageGraph {
    pub fn export_for_visualization(&self) -> VisualizationExport {
        VisualizationExport {
            nodes: self
                .nodes()
                .iter()
                .map(|node| VisualNode {
                    id: node.id.clone(),
                    name: node.name.clone(),
                    kind: node.kind,
                    metadata: node.metadata.clone(),
                })
                .collect(),
            links: self
                .edges()
                .iter()
                .map(|edge| VisualLink {
                    source: edge.from.clone(),
                    target: edge.to.clone(),
                    kind: edge.kind,
                })
                .collect(),
        }
    }

    /// Render the first `max_nodes` nodes as a Mermaid flowchart.
    ///
    /// Dataflows are drawn as rectangles and datasets as cylinders. Edges
    /// touching a node beyond the cut are omitted.
    pub fn generate_mermaid_diagram(&self, max_nodes: usize) -> String {
        let shown = &self.nodes()[..self.node_count().min(max_nodes)];
        let aliases: HashMap<&str, String> = shown
            .iter()
            .enumerate()
            .map(|(i, node)| (node.id.as_str(), format!("n{}", i)))
            .collect();

        let mut out = String::from("graph LR\n");
        if shown.len() < self.node_count() {
            let _ = writeln!(
                out,
                "    %% showing {} of {} nodes",
                shown.len(),
                self.node_count()
            );
        }

        for (i, node) in shown.iter().enumerate() {
            let alias = format!("n{}", i);
            let label = escape_label(&node.name);
            let _ = match node.kind {
                EntityKind::Dataflow => writeln!(out, "    {}[\"{}\"]:::dataflow", alias, label),
                EntityKind::Dataset => writeln!(out, "    {}[(\"{}\")]:::dataset", alias, label),
            };
        }

        for edge in self.edges() {
            let (Some(from), Some(to)) =
                (aliases.get(edge.from.as_str()), aliases.get(edge.to.as_str()))
            else {
                continue;
            };
            let _ = writeln!(out, "    {} -->|{}| {}", from, edge.kind.as_str(), to);
        }

        let _ = writeln!(out, "    {}", DATAFLOW_CLASS);
        let _ = writeln!(out, "    {}", DATASET_CLASS);
        out
    }

    pub fn statistics(&self) -> GraphStatistics {
        let mut stats = GraphStatistics::default();
        for node in self.nodes() {
            match node.kind {
                EntityKind::Dataflow => stats.dataflow_count += 1,
                EntityKind::Dataset => {
                    stats.dataset_count += 1;
                    let usage = self.dataset_usage(&node.id);
                    if !usage.iter().any(|u| u.role == EdgeKind::Output) {
                        stats.source_datasets.push(node.id.clone());
                    }
                    if !usage.iter().any(|u| u.role == EdgeKind::Input) {
                        stats.sink_datasets.push(node.id.clone());
                    }
                }
            }
        }
        for edge in self.edges() {
            match edge.kind {
                EdgeKind::Input => stats.input_edge_count += 1,
                EdgeKind::Output => stats.output_edge_count += 1,
            }
        }
        stats
    }
}

/// Make a node name safe inside a quoted Mermaid label.
fn escape_label(name: &str) -> String {
    let mut escaped = String::with_capacity(name.len());
    for c in name.chars() {
        match c {
            '"' => escaped.push_str("#quot;"),
            '<' => escaped.push_str("#lt;"),
            '>' => escaped.push_str("#gt;"),
            '\n' | '\r' => escaped.push(' '),
            other => escaped.push(other),
        }
    }
    escaped
}

// ============================================================================
// TESTS
// ============================================================================
