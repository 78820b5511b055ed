//! Sluice Test Utilities
//!
//! Shared test infrastructure for the sluice workspace:
//! - Mock API collaborators with call counters and failure injection
//! - Proptest generators for keys, search parameters and dataflow graphs
//! - Fixtures for common payloads and lineage shapes
//! - Assertions for sluice error variants
//! - Test-scoped tracing initialisation

// Re-export core types for convenience
pub use sluice_core::{
    CacheSettings, DatasetRef, Dataflow, DataflowUpdate, DualResponse, EntityKind, FetchError,
    SearchPage, SearchParams, SearchSort, SluiceError, SluiceResult, ValidationError,
};
pub use sluice_storage::{CacheStore, InMemoryCacheBackend, ManualClock};

use async_trait::async_trait;
use serde_json::{json, Value};
use sluice_client::{DataflowManager, DataflowMutator, DataflowSearcher, EntityFetcher};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once, PoisonError};
use std::time::Duration;

/// Install a `fmt` subscriber honouring `RUST_LOG`. Safe to call from every test.
pub fn init_test_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

// ============================================================================
// MOCK COLLABORATORS
// ============================================================================

/// Search collaborator over a fixed list of raw records.
///
/// Filters by case-insensitive substring of `name`, then pages by
/// offset/limit, and answers in the `{dataFlows, totalCount}` shape.
#[derive(Debug, Default)]
pub struct MockSearcher {
    records: Mutex<Vec<Value>>,
    failure: Mutex<Option<SluiceError>>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl MockSearcher {
    pub fn new(records: Vec<Value>) -> Self {
        Self {
            records: Mutex::new(records),
            ..Default::default()
        }
    }

    /// Sleep this long inside every call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn set_records(&self, records: Vec<Value>) {
        *self.records.lock().unwrap_or_else(PoisonError::into_inner) = records;
    }

    /// Fail every call with `error` until [`clear_failure`](Self::clear_failure).
    pub fn fail_with(&self, error: SluiceError) {
        *self.failure.lock().unwrap_or_else(PoisonError::into_inner) = Some(error);
    }

    pub fn clear_failure(&self) {
        *self.failure.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DataflowSearcher for MockSearcher {
    async fn search(&self, params: &SearchParams) -> SluiceResult<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = self.failure.lock().unwrap_or_else(PoisonError::into_inner).clone() {
            return Err(error);
        }

        let needle = params.query.to_lowercase();
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        let matching: Vec<&Value> = records
            .iter()
            .filter(|record| {
                needle.is_empty()
                    || record["name"]
                        .as_str()
                        .is_some_and(|name| name.to_lowercase().contains(&needle))
            })
            .collect();
        let page: Vec<Value> = matching
            .iter()
            .skip(params.offset)
            .take(params.limit)
            .map(|record| (*record).clone())
            .collect();

        Ok(json!({ "dataFlows": page, "totalCount": matching.len() }))
    }
}

/// Single-entity collaborator answering from a map of raw payloads.
///
/// Unknown ids answer `FetchError::NotFound`.
#[derive(Debug, Default)]
pub struct MockFetcher {
    payloads: Mutex<HashMap<String, Value>>,
    failure: Mutex<Option<SluiceError>>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_payload(self, id: impl Into<String>, payload: Value) -> Self {
        self.insert(id, payload);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn insert(&self, id: impl Into<String>, payload: Value) {
        self.payloads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.into(), payload);
    }

    pub fn fail_with(&self, error: SluiceError) {
        *self.failure.lock().unwrap_or_else(PoisonError::into_inner) = Some(error);
    }

    pub fn clear_failure(&self) {
        *self.failure.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EntityFetcher for MockFetcher {
    async fn fetch(&self, kind: EntityKind, id: &str) -> SluiceResult<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        // The response reflects state at request time, not at reply time
        let failure = self.failure.lock().unwrap_or_else(PoisonError::into_inner).clone();
        let payload = self
            .payloads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned();
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = failure {
            return Err(error);
        }
        payload.ok_or_else(|| {
            FetchError::NotFound {
                kind,
                id: id.to_string(),
            }
            .into()
        })
    }
}

/// Mutation collaborator that records every call.
#[derive(Debug, Default)]
pub struct MockMutator {
    updates: Mutex<Vec<(String, DataflowUpdate)>>,
    executions: Mutex<Vec<String>>,
    failure: Mutex<Option<SluiceError>>,
}

impl MockMutator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_with(&self, error: SluiceError) {
        *self.failure.lock().unwrap_or_else(PoisonError::into_inner) = Some(error);
    }

    pub fn updates(&self) -> Vec<(String, DataflowUpdate)> {
        self.updates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn executions(&self) -> Vec<String> {
        self.executions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn check_failure(&self) -> SluiceResult<()> {
        match self.failure.lock().unwrap_or_else(PoisonError::into_inner).clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl DataflowMutator for MockMutator {
    async fn update(&self, id: &str, changes: &DataflowUpdate) -> SluiceResult<Value> {
        self.check_failure()?;
        self.updates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id.to_string(), changes.clone()));
        Ok(json!({
            "id": id,
            "name": changes.name.clone().unwrap_or_else(|| "updated".to_string()),
            "description": changes.description,
            "enabled": changes.enabled,
            "owner": changes.owner,
        }))
    }

    async fn execute(&self, id: &str) -> SluiceResult<Value> {
        self.check_failure()?;
        let mut executions = self.executions.lock().unwrap_or_else(PoisonError::into_inner);
        executions.push(id.to_string());
        Ok(json!({
            "id": format!("exec-{}", executions.len()),
            "onboardFlowId": id,
            "state": "RUNNING",
            "beginTime": 1_700_000_000_000i64,
        }))
    }
}

/// One set of mock collaborators wired into a manager.
#[derive(Debug, Clone)]
pub struct MockApi {
    pub searcher: Arc<MockSearcher>,
    pub primary: Arc<MockFetcher>,
    pub secondary: Arc<MockFetcher>,
    pub mutator: Arc<MockMutator>,
}

impl MockApi {
    pub fn new(searcher: MockSearcher, primary: MockFetcher, secondary: MockFetcher) -> Self {
        Self {
            searcher: Arc::new(searcher),
            primary: Arc::new(primary),
            secondary: Arc::new(secondary),
            mutator: Arc::new(MockMutator::new()),
        }
    }

    /// Manager over `store`; `enhanced` wires in the secondary fetcher.
    pub fn manager(&self, store: CacheStore, enhanced: bool) -> DataflowManager {
        let manager = DataflowManager::new(
            store,
            self.searcher.clone(),
            self.primary.clone(),
            self.mutator.clone(),
        );
        if enhanced {
            manager.with_secondary(self.secondary.clone())
        } else {
            manager
        }
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for sluice inputs.

    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    /// Short opaque entity id.
    pub fn arb_entity_id() -> impl Strategy<Value = String> {
        "[a-z0-9]{1,8}"
    }

    /// Scalar JSON parameter value.
    pub fn arb_param_value() -> impl Strategy<Value = Value> {
        prop_oneof![
            any::<i64>().prop_map(Value::from),
            any::<bool>().prop_map(Value::from),
            "[a-zA-Z0-9 :_-]{0,12}".prop_map(Value::from),
        ]
    }

    /// Parameter mapping with distinct names.
    pub fn arb_param_map() -> impl Strategy<Value = BTreeMap<String, Value>> {
        prop::collection::btree_map("[a-z_]{1,10}", arb_param_value(), 0..6)
    }

    pub fn arb_search_params() -> impl Strategy<Value = SearchParams> {
        (
            "[a-z ]{0,10}",
            1usize..200,
            0usize..1000,
            prop::option::of(("[a-z]{1,8}", any::<bool>())),
        )
            .prop_map(|(query, limit, offset, sort)| {
                let params = SearchParams::new(query, limit, offset);
                match sort {
                    Some((field, true)) => params.sorted(SearchSort::asc(field)),
                    Some((field, false)) => params.sorted(SearchSort::desc(field)),
                    None => params,
                }
            })
    }

    /// Dataflows `F0..` wired to datasets drawn from `D0..D{datasets}`.
    ///
    /// Inputs and outputs are chosen independently, so cycles and shared
    /// datasets are common.
    pub fn arb_dataflows(
        max_flows: usize,
        datasets: usize,
    ) -> impl Strategy<Value = Vec<Dataflow>> {
        let datasets = datasets.max(1);
        let refs = move || prop::collection::vec(0..datasets, 0..4);
        prop::collection::vec((refs(), refs()), 1..=max_flows.max(1)).prop_map(|flows| {
            flows
                .into_iter()
                .enumerate()
                .map(|(i, (inputs, outputs))| {
                    let mut dataflow = Dataflow::new(format!("F{}", i), format!("flow {}", i));
                    dataflow.inputs = inputs
                        .into_iter()
                        .map(|d| DatasetRef::new(format!("D{}", d)))
                        .collect();
                    dataflow.outputs = outputs
                        .into_iter()
                        .map(|d| DatasetRef::new(format!("D{}", d)))
                        .collect();
                    dataflow
                })
                .collect()
        })
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built payloads and graphs for common testing scenarios.

    use super::*;

    /// Primary-endpoint payload with the given dataset references.
    pub fn dataflow_payload(id: &str, name: &str, inputs: &[&str], outputs: &[&str]) -> Value {
        let refs = |ids: &[&str]| -> Vec<Value> {
            ids.iter()
                .map(|d| json!({ "dataSourceId": d, "dataSourceName": format!("{} table", d) }))
                .collect()
        };
        json!({
            "id": id,
            "name": name,
            "description": format!("{} description", name),
            "owner": "owner-1",
            "enabled": true,
            "databaseType": "MAGIC",
            "runCount": 3,
            "lastExecution": { "state": "SUCCESS", "beginTime": 1_700_000_000_000i64 },
            "inputs": refs(inputs),
            "outputs": refs(outputs),
        })
    }

    /// Enhanced-endpoint payload carrying every secondary-only section.
    ///
    /// Its `name` deliberately differs from the primary fixture's.
    pub fn secondary_payload(id: &str) -> Value {
        json!({
            "id": id,
            "name": "Name From Enhanced API",
            "triggerSettings": {
                "triggers": [{
                    "title": "nightly",
                    "triggerEvents": [{ "type": "SCHEDULE", "schedule": "0 2 * * *" }],
                    "triggerConditions": []
                }],
                "zoneId": "UTC",
                "locale": "en_US"
            },
            "engineProperties": { "kryo": "true", "partitions": 8 },
            "graph": { "nodes": [{ "id": "n1", "x": 10.0, "y": 20.0 }] },
            "actions": [
                { "id": "a1", "type": "LoadFromVault", "name": "Input" },
                { "id": "a2", "type": "PublishToVault", "name": "Output", "dependsOn": ["a1"] }
            ]
        })
    }

    /// `A` writes `D1`; `B` reads `D1` and writes `D2`.
    pub fn chain_dataflows() -> Vec<Dataflow> {
        vec![
            Dataflow::new("A", "Ingest").with_output(DatasetRef::new("D1")),
            Dataflow::new("B", "Transform")
                .with_input(DatasetRef::new("D1"))
                .with_output(DatasetRef::new("D2")),
        ]
    }

    /// `C` both reads and writes `D3`, and also writes `D4`.
    pub fn cyclic_dataflows() -> Vec<Dataflow> {
        vec![Dataflow::new("C", "Incremental")
            .with_input(DatasetRef::new("D3"))
            .with_output(DatasetRef::new("D3"))
            .with_output(DatasetRef::new("D4"))]
    }

    /// In-memory store driven by a manual clock.
    pub fn manual_clock_store(default_ttl: Duration) -> (Arc<ManualClock>, CacheStore) {
        let clock = Arc::new(ManualClock::starting_now());
        let store = CacheStore::with_clock(
            Arc::new(InMemoryCacheBackend::new()),
            default_ttl,
            clock.clone(),
        );
        (clock, store)
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertion helpers for sluice error variants.

    use super::*;

    /// Assert that a SluiceResult is a Fetch error.
    #[track_caller]
    pub fn assert_fetch_error<T: std::fmt::Debug>(result: &SluiceResult<T>) {
        match result {
            Err(SluiceError::Fetch(_)) => {}
            other => panic!("Expected Fetch error, got: {:?}", other),
        }
    }

    /// Assert that a SluiceResult is a NotFound fetch error for `id`.
    #[track_caller]
    pub fn assert_not_found<T: std::fmt::Debug>(result: &SluiceResult<T>, id: &str) {
        match result {
            Err(SluiceError::Fetch(FetchError::NotFound { id: got, .. })) => {
                assert_eq!(got, id, "Wrong id in NotFound error");
            }
            other => panic!("Expected NotFound error for {}, got: {:?}", id, other),
        }
    }

    /// Assert that a SluiceResult is a Validation error.
    #[track_caller]
    pub fn assert_validation_error<T: std::fmt::Debug>(result: &SluiceResult<T>) {
        match result {
            Err(SluiceError::Validation(_)) => {}
            other => panic!("Expected Validation error, got: {:?}", other),
        }
    }
}
