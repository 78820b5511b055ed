//! Queries over a built [`LineageGraph`].
//!
//! Every query is total: an unknown id yields an empty or `None` result and
//! a warning, never an error.

use std::collections::{HashSet, VecDeque};

use serde::Serialize;

use crate::graph::{EdgeKind, LineageEdge, LineageGraph, LineageNode};

/// One simple path between two nodes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataPath {
    pub nodes: Vec<String>,
    pub edges: Vec<LineageEdge>,
    pub hops: usize,
}

/// Dataflows and datasets one hop away on one side of a dataset.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct DependencySet {
    pub dataflows: Vec<LineageNode>,
    pub datasets: Vec<LineageNode>,
}

impl DependencySet {
    pub fn dataflow_ids(&self) -> Vec<&str> {
        self.dataflows.iter().map(|n| n.id.as_str()).collect()
    }

    pub fn dataset_ids(&self) -> Vec<&str> {
        self.datasets.iter().map(|n| n.id.as_str()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetDependencies {
    pub dataset: LineageNode,
    pub upstream: DependencySet,
    pub downstream: DependencySet,
}

/// Direction and reach of a transitive lineage query.
///
/// Both directions are explicit; there is no default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineageQuery {
    pub upstream: bool,
    pub downstream: bool,
    /// Maximum hops from the root. `None` walks to exhaustion.
    pub max_depth: Option<usize>,
}

impl LineageQuery {
    pub fn new(upstream: bool, downstream: bool) -> Self {
        Self {
            upstream,
            downstream,
            max_depth: None,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = Some(max_depth);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineageHop {
    pub node: LineageNode,
    /// Hops from the root.
    pub depth: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineageResult {
    pub root: LineageNode,
    /// Nodes reachable against edge direction, nearest first.
    pub upstream: Vec<LineageHop>,
    /// Nodes reachable along edge direction, nearest first.
    pub downstream: Vec<LineageHop>,
}

// ============================================================================
// PATH TRACING
// ============================================================================

struct PathSearch<'g> {
    graph: &'g LineageGraph,
    target: usize,
    max_hops: Option<usize>,
    visited: HashSet<usize>,
    nodes: Vec<usize>,
    edges: Vec<usize>,
    found: Vec<DataPath>,
}

/// A node on the current path and the next outgoing edge to try from it.
#[derive(Clone, Copy)]
struct Frame {
    node: usize,
    cursor: usize,
}

impl PathSearch<'_> {
    /// Depth-first search with an explicit stack, so path length is bounded
    /// by memory rather than by the thread's stack.
    fn run(mut self, source: usize) -> Vec<DataPath> {
        let graph = self.graph;
        let mut stack = Vec::new();
        self.enter(source, &mut stack);

        while let Some(&Frame { node, cursor }) = stack.last() {
            let outgoing = graph.outgoing_at(node);
            let expand =
                node != self.target && self.max_hops.map_or(true, |max| self.edges.len() < max);

            if expand && cursor < outgoing.len() {
                if let Some(top) = stack.last_mut() {
                    top.cursor += 1;
                }
                let edge = outgoing[cursor];
                let Some(next) = graph.position(&graph.edge_at(edge).to) else {
                    continue;
                };
                if self.visited.contains(&next) {
                    continue;
                }
                self.edges.push(edge);
                self.enter(next, &mut stack);
            } else {
                stack.pop();
                self.nodes.pop();
                // The root has no incoming path edge
                self.edges.pop();
                self.visited.remove(&node);
            }
        }
        self.found
    }

    fn enter(&mut self, position: usize, stack: &mut Vec<Frame>) {
        self.visited.insert(position);
        self.nodes.push(position);
        if position == self.target {
            self.record();
        }
        stack.push(Frame {
            node: position,
            cursor: 0,
        });
    }

    fn record(&mut self) {
        self.found.push(DataPath {
            nodes: self
                .nodes
                .iter()
                .map(|&n| self.graph.node_at(n).id.clone())
                .collect(),
            edges: self
                .edges
                .iter()
                .map(|&e| self.graph.edge_at(e).clone())
                .collect(),
            hops: self.edges.len(),
        });
    }
}

impl LineageGraph {
    /// Every simple path from `source` to `target` along edge direction.
    ///
    /// A node never appears twice within one path, but may appear on several
    /// paths. `max_hops` bounds path length; `None` allows any simple path.
    pub fn trace_data_path(
        &self,
        source: &str,
        target: &str,
        max_hops: Option<usize>,
    ) -> Vec<DataPath> {
        let (Some(source_at), Some(target_at)) = (self.position(source), self.position(target))
        else {
            tracing::warn!(source, target, "path endpoint not in lineage graph");
            return Vec::new();
        };

        PathSearch {
            graph: self,
            target: target_at,
            max_hops,
            visited: HashSet::new(),
            nodes: Vec::new(),
            edges: Vec::new(),
            found: Vec::new(),
        }
        .run(source_at)
    }

    // ========================================================================
    // ONE-HOP DEPENDENCIES
    // ========================================================================

    /// Producers and consumers of a dataset, one hop each way.
    ///
    /// Upstream holds the dataflows writing `dataset_id` and their input
    /// datasets; downstream holds the dataflows reading it and their output
    /// datasets. `dataset_id` itself is never listed. Returns `None` unless
    /// `dataset_id` is a dataset node.
    pub fn dataset_dependencies(&self, dataset_id: &str) -> Option<DatasetDependencies> {
        let dataset = match self.node(dataset_id) {
            Some(node) if node.is_dataset() => node.clone(),
            _ => {
                tracing::warn!(entity_id = dataset_id, "dataset not in lineage graph");
                return None;
            }
        };

        let mut upstream = Collector::new(self, dataset_id);
        let mut downstream = Collector::new(self, dataset_id);
        for usage in self.dataset_usage(dataset_id) {
            match usage.role {
                EdgeKind::Output => {
                    upstream.dataflow(&usage.dataflow_id);
                    for input in self.datasets_of(&usage.dataflow_id, EdgeKind::Input) {
                        upstream.dataset(input);
                    }
                }
                EdgeKind::Input => {
                    downstream.dataflow(&usage.dataflow_id);
                    for output in self.datasets_of(&usage.dataflow_id, EdgeKind::Output) {
                        downstream.dataset(output);
                    }
                }
            }
        }

        Some(DatasetDependencies {
            dataset,
            upstream: upstream.finish(),
            downstream: downstream.finish(),
        })
    }

    // ========================================================================
    // TRANSITIVE LINEAGE
    // ========================================================================

    /// Breadth-first walk from `id` in the directions `query` selects.
    pub fn lineage(&self, id: &str, query: LineageQuery) -> Option<LineageResult> {
        let Some(root_at) = self.position(id) else {
            tracing::warn!(entity_id = id, "lineage root not in lineage graph");
            return None;
        };

        let upstream = if query.upstream {
            self.walk(root_at, query.max_depth, |graph, at| {
                graph
                    .incoming_at(at)
                    .iter()
                    .filter_map(|&e| graph.position(&graph.edge_at(e).from))
                    .collect()
            })
        } else {
            Vec::new()
        };
        let downstream = if query.downstream {
            self.walk(root_at, query.max_depth, |graph, at| {
                graph
                    .outgoing_at(at)
                    .iter()
                    .filter_map(|&e| graph.position(&graph.edge_at(e).to))
                    .collect()
            })
        } else {
            Vec::new()
        };

        Some(LineageResult {
            root: self.node_at(root_at).clone(),
            upstream,
            downstream,
        })
    }

    fn walk(
        &self,
        root: usize,
        max_depth: Option<usize>,
        neighbours: impl Fn(&Self, usize) -> Vec<usize>,
    ) -> Vec<LineageHop> {
        let mut seen = HashSet::from([root]);
        let mut queue = VecDeque::from([(root, 0usize)]);
        let mut hops = Vec::new();

        while let Some((at, depth)) = queue.pop_front() {
            if max_depth.is_some_and(|max| depth >= max) {
                continue;
            }
            for next in neighbours(self, at) {
                if seen.insert(next) {
                    hops.push(LineageHop {
                        node: self.node_at(next).clone(),
                        depth: depth + 1,
                    });
                    queue.push_back((next, depth + 1));
                }
            }
        }
        hops
    }
}

/// Ordered, de-duplicated node collection for one side of a dataset.
struct Collector<'g> {
    graph: &'g LineageGraph,
    exclude: &'g str,
    seen: HashSet<&'g str>,
    set: DependencySet,
}

impl<'g> Collector<'g> {
    fn new(graph: &'g LineageGraph, exclude: &'g str) -> Self {
        Self {
            graph,
            exclude,
            seen: HashSet::new(),
            set: DependencySet::default(),
        }
    }

    fn dataflow(&mut self, id: &'g str) {
        if let Some(node) = self.admit(id) {
            self.set.dataflows.push(node);
        }
    }

    fn dataset(&mut self, id: &'g str) {
        if let Some(node) = self.admit(id) {
            self.set.datasets.push(node);
        }
    }

    fn admit(&mut self, id: &'g str) -> Option<LineageNode> {
        if id == self.exclude || !self.seen.insert(id) {
            return None;
        }
        self.graph.node(id).cloned()
    }

    fn finish(self) -> DependencySet {
        self.set
    }
}

// ============================================================================
// TESTS
// ============================================================================
