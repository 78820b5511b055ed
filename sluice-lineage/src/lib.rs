//! Sluice Lineage - Dependency graph over datasets and dataflows
//!
//! Builds a directed graph from a flat dataflow listing: a dataset feeds a
//! dataflow through an `input` edge and a dataflow produces a dataset
//! through an `output` edge. The [`LineageEngine`] holds the current
//! snapshot and answers path, dependency and export queries against it.

pub mod engine;
pub mod export;
pub mod graph;
pub mod traverse;

pub use engine::LineageEngine;
pub use export::{GraphStatistics, VisualLink, VisualNode, VisualizationExport};
pub use graph::{DatasetUsage, EdgeKind, LineageEdge, LineageGraph, LineageNode, NodeMetadata};
pub use traverse::{
    DataPath, DatasetDependencies, DependencySet, LineageHop, LineageQuery, LineageResult,
};
