//! Shared lineage engine with atomic snapshot replacement.
//!
//! A rebuild constructs a complete [`LineageGraph`] off to the side and then
//! swaps one `Arc` under a write lock. Readers clone the current `Arc` and
//! query it without holding the lock, so a query never sees a half-built
//! graph and a rebuild never waits on a slow query.

use std::sync::{Arc, RwLock};

use serde_json::Value;
use sluice_core::{dataflow_from_primary, Dataflow, LineageSettings};

use crate::export::{GraphStatistics, VisualizationExport};
use crate::graph::LineageGraph;
use crate::traverse::{DataPath, DatasetDependencies, LineageQuery, LineageResult};

#[derive(Debug, Default)]
pub struct LineageEngine {
    current: RwLock<Arc<LineageGraph>>,
    settings: LineageSettings,
}

impl LineageEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(settings: LineageSettings) -> Self {
        Self {
            current: RwLock::default(),
            settings,
        }
    }

    pub fn settings(&self) -> &LineageSettings {
        &self.settings
    }

    /// The graph as of the last completed rebuild.
    pub fn snapshot(&self) -> Arc<LineageGraph> {
        self.current
            .read()
            .map(|graph| Arc::clone(&*graph))
            .unwrap_or_else(|poisoned| Arc::clone(&*poisoned.into_inner()))
    }

    /// Replace the current graph with one built from `dataflows`.
    pub fn build_lineage_graph(&self, dataflows: &[Dataflow]) -> Arc<LineageGraph> {
        let graph = Arc::new(LineageGraph::build(dataflows));
        let stats = graph.statistics();
        tracing::info!(
            dataflows = stats.dataflow_count,
            datasets = stats.dataset_count,
            edges = graph.edge_count(),
            "rebuilt lineage graph"
        );

        let mut current = self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *current = Arc::clone(&graph);
        graph
    }

    /// Map raw listing records and rebuild. Records that do not map are
    /// skipped with a warning.
    pub fn build_from_payloads(&self, records: &[Value]) -> Arc<LineageGraph> {
        let dataflows: Vec<Dataflow> = records
            .iter()
            .enumerate()
            .filter_map(|(position, record)| match dataflow_from_primary(record) {
                Ok(dataflow) => Some(dataflow),
                Err(e) => {
                    tracing::warn!(position, error = %e, "skipping malformed dataflow record");
                    None
                }
            })
            .collect();
        self.build_lineage_graph(&dataflows)
    }

    /// Simple paths from `source` to `target`, bounded by the configured
    /// maximum trace depth.
    pub fn trace_data_path(&self, source: &str, target: &str) -> Vec<DataPath> {
        self.snapshot()
            .trace_data_path(source, target, self.settings.max_trace_depth)
    }

    pub fn get_dataset_dependencies(&self, dataset_id: &str) -> Option<DatasetDependencies> {
        self.snapshot().dataset_dependencies(dataset_id)
    }

    pub fn lineage(&self, id: &str, query: LineageQuery) -> Option<LineageResult> {
        self.snapshot().lineage(id, query)
    }

    pub fn export_for_visualization(&self) -> VisualizationExport {
        self.snapshot().export_for_visualization()
    }

    pub fn generate_mermaid_diagram(&self, max_nodes: usize) -> String {
        self.snapshot().generate_mermaid_diagram(max_nodes)
    }

    /// Mermaid diagram using the configured node budget.
    pub fn mermaid_diagram(&self) -> String {
        self.generate_mermaid_diagram(self.settings.default_mermaid_max_nodes)
    }

    pub fn statistics(&self) -> GraphStatistics {
        self.snapshot().statistics()
    }
}
