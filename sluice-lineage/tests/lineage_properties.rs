//! Property and scenario tests for the lineage engine.

use std::collections::HashSet;
use std::sync::Arc;

use proptest::prelude::*;
use sluice_lineage::{EdgeKind, LineageEngine, LineageGraph, LineageQuery};
use sluice_test_utils::fixtures::{chain_dataflows, cyclic_dataflows, dataflow_payload};
use sluice_test_utils::generators::arb_dataflows;
use sluice_test_utils::init_test_tracing;

// ============================================================================
// SCENARIOS
// ============================================================================

#[test]
fn test_trace_chain_end_to_end() {
    init_test_tracing();
    let engine = LineageEngine::new();
    engine.build_lineage_graph(&chain_dataflows());

    let paths = engine.trace_data_path("A", "D2");
    assert_eq!(paths.len(), 1);
    assert_eq!(paths[0].nodes, vec!["A", "D1", "B", "D2"]);
    assert!(engine.trace_data_path("A", "unknown").is_empty());
}

#[test]
fn test_dependencies_stop_after_one_hop() {
    let engine = LineageEngine::new();
    engine.build_lineage_graph(&chain_dataflows());

    let deps = engine.get_dataset_dependencies("D1").unwrap();
    assert_eq!(deps.upstream.dataflow_ids(), vec!["A"]);
    assert_eq!(deps.downstream.dataflow_ids(), vec!["B"]);
    assert_eq!(deps.downstream.dataset_ids(), vec!["D2"]);

    let mentioned: Vec<&str> = deps
        .upstream
        .dataset_ids()
        .into_iter()
        .chain(deps.upstream.dataflow_ids())
        .chain(deps.downstream.dataflow_ids())
        .collect();
    assert!(!mentioned.contains(&"D2"));
}

#[test]
fn test_cycle_terminates_with_simple_paths() {
    let engine = LineageEngine::new();
    engine.build_lineage_graph(&cyclic_dataflows());

    let paths = engine.trace_data_path("D3", "D4");
    assert_eq!(paths.len(), 1);
    assert_eq!(paths[0].nodes, vec!["D3", "C", "D4"]);

    // The self-loop through C is one hop each way
    let deps = engine.get_dataset_dependencies("D3").unwrap();
    assert_eq!(deps.upstream.dataflow_ids(), vec!["C"]);
    assert_eq!(deps.downstream.dataflow_ids(), vec!["C"]);
    assert_eq!(deps.downstream.dataset_ids(), vec!["D4"]);
}

#[test]
fn test_rebuild_with_disjoint_set_is_full_replace() {
    let engine = LineageEngine::new();
    engine.build_lineage_graph(&chain_dataflows());
    engine.build_lineage_graph(&cyclic_dataflows());

    let graph = engine.snapshot();
    for stale in ["A", "B", "D1", "D2"] {
        assert!(!graph.contains(stale), "{} survived the rebuild", stale);
    }
    assert!(graph
        .edges()
        .iter()
        .all(|e| e.from != "A" && e.to != "D2"));
    assert!(engine.trace_data_path("A", "D2").is_empty());
}

#[test]
fn test_graph_from_raw_listing() {
    let engine = LineageEngine::new();
    engine.build_from_payloads(&[
        dataflow_payload("10", "Orders ETL", &["orders_raw"], &["orders"]),
        dataflow_payload("11", "Orders report", &["orders"], &["orders_report"]),
    ]);

    let lineage = engine
        .lineage("orders_raw", LineageQuery::new(false, true))
        .unwrap();
    let ids: Vec<&str> = lineage.downstream.iter().map(|h| h.node.id.as_str()).collect();
    assert_eq!(ids, vec!["10", "orders", "11", "orders_report"]);

    let stats = engine.statistics();
    assert_eq!(stats.source_datasets, vec!["orders_raw".to_string()]);
    assert_eq!(stats.sink_datasets, vec!["orders_report".to_string()]);

    let node = engine.snapshot().node("orders").cloned().unwrap();
    assert_eq!(node.name, "orders table");
}

#[test]
fn test_mermaid_uses_configured_budget() {
    let engine = LineageEngine::with_settings(sluice_core::LineageSettings {
        default_mermaid_max_nodes: 2,
        ..Default::default()
    });
    engine.build_lineage_graph(&chain_dataflows());
    let diagram = engine.mermaid_diagram();
    assert!(diagram.contains("%% showing 2 of 4 nodes"));
    // A and B are both dataflows; no edge joins them directly
    assert!(!diagram.contains("-->"));
}

#[test]
fn test_readers_during_rebuild_see_whole_graphs() {
    let engine = Arc::new(LineageEngine::new());
    engine.build_lineage_graph(&chain_dataflows());

    let writer = {
        let engine = engine.clone();
        std::thread::spawn(move || {
            for i in 0..200 {
                if i % 2 == 0 {
                    engine.build_lineage_graph(&cyclic_dataflows());
                } else {
                    engine.build_lineage_graph(&chain_dataflows());
                }
            }
        })
    };

    for _ in 0..200 {
        let graph = engine.snapshot();
        let count = graph.node_count();
        // Either complete chain (4 nodes) or complete cycle (3 nodes)
        assert!(count == 4 || count == 3, "observed {} nodes", count);
        for edge in graph.edges() {
            assert!(graph.contains(&edge.from) && graph.contains(&edge.to));
        }
    }
    writer.join().unwrap();
}

// ============================================================================
// PROPERTIES
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Every edge joins two existing nodes of opposite kinds.
    #[test]
    fn prop_edges_reference_existing_nodes(flows in arb_dataflows(8, 6)) {
        let graph = LineageGraph::build(&flows);
        for edge in graph.edges() {
            let from = graph.node(&edge.from);
            let to = graph.node(&edge.to);
            prop_assert!(from.is_some() && to.is_some());
            let (from, to) = (from.unwrap(), to.unwrap());
            match edge.kind {
                EdgeKind::Input => prop_assert!(from.is_dataset() && to.is_dataflow()),
                EdgeKind::Output => prop_assert!(from.is_dataflow() && to.is_dataset()),
            }
        }
    }

    /// Traced paths are simple, connected and end where asked.
    #[test]
    fn prop_traced_paths_are_simple(flows in arb_dataflows(6, 4), from in 0usize..4, to in 0usize..4) {
        let graph = LineageGraph::build(&flows);
        let source = format!("D{}", from);
        let target = format!("D{}", to);

        for path in graph.trace_data_path(&source, &target, None) {
            let unique: HashSet<&String> = path.nodes.iter().collect();
            prop_assert_eq!(unique.len(), path.nodes.len());
            prop_assert_eq!(path.hops, path.edges.len());
            prop_assert_eq!(path.nodes.len(), path.edges.len() + 1);
            prop_assert_eq!(path.nodes.first(), Some(&source));
            prop_assert_eq!(path.nodes.last(), Some(&target));
            for (i, edge) in path.edges.iter().enumerate() {
                prop_assert_eq!(&edge.from, &path.nodes[i]);
                prop_assert_eq!(&edge.to, &path.nodes[i + 1]);
            }
        }
    }

    /// One-hop dependencies agree with a scan over all edges.
    #[test]
    fn prop_dependencies_match_edge_scan(flows in arb_dataflows(8, 5), pick in 0usize..5) {
        let graph = LineageGraph::build(&flows);
        let dataset = format!("D{}", pick);
        let Some(deps) = graph.dataset_dependencies(&dataset) else {
            prop_assert!(!graph.contains(&dataset));
            return Ok(());
        };

        let producers: HashSet<&str> = graph
            .edges()
            .iter()
            .filter(|e| e.kind == EdgeKind::Output && e.to == dataset)
            .map(|e| e.from.as_str())
            .collect();
        let consumers: HashSet<&str> = graph
            .edges()
            .iter()
            .filter(|e| e.kind == EdgeKind::Input && e.from == dataset)
            .map(|e| e.to.as_str())
            .collect();

        let upstream: HashSet<&str> = deps.upstream.dataflow_ids().into_iter().collect();
        let downstream: HashSet<&str> = deps.downstream.dataflow_ids().into_iter().collect();
        prop_assert_eq!(upstream, producers);
        prop_assert_eq!(downstream, consumers);
    }

    /// Rebuilding leaves exactly the second input's nodes.
    #[test]
    fn prop_rebuild_is_full_replace(first in arb_dataflows(5, 4), second in arb_dataflows(5, 4)) {
        let engine = LineageEngine::new();
        engine.build_lineage_graph(&first);
        engine.build_lineage_graph(&second);

        let expected = LineageGraph::build(&second);
        let graph = engine.snapshot();
        prop_assert_eq!(graph.nodes(), expected.nodes());
        prop_assert_eq!(graph.edges(), expected.edges());
    }
}
