//! Integration tests for DataflowManager against mock collaborators.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use sluice_client::DataflowManager;
use sluice_storage::ReadOrigin;
use sluice_test_utils::assertions::{assert_fetch_error, assert_not_found};
use sluice_test_utils::fixtures::{dataflow_payload, manual_clock_store, secondary_payload};
use sluice_test_utils::{
    init_test_tracing, CacheStore, DataflowUpdate, EntityKind, FetchError, MockApi, MockFetcher,
    MockSearcher, SearchParams, SearchSort, SluiceError,
};

fn api() -> MockApi {
    let records = vec![
        dataflow_payload("1", "Sales ETL", &["raw_sales"], &["sales"]),
        dataflow_payload("2", "Sales rollup", &["sales"], &["sales_daily"]),
        dataflow_payload("3", "Marketing", &["leads"], &["campaigns"]),
    ];
    let primary = MockFetcher::new()
        .with_payload("1", records[0].clone())
        .with_payload("2", records[1].clone());
    let secondary = MockFetcher::new().with_payload("1", secondary_payload("1"));
    MockApi::new(MockSearcher::new(records), primary, secondary)
}

// ============================================================================
// SEARCH
// ============================================================================

#[tokio::test]
async fn test_search_caches_each_parameter_set_independently() {
    init_test_tracing();
    let api = api();
    let manager = api.manager(CacheStore::in_memory(), false);

    let plain = SearchParams::new("sales", 10, 0);
    let by_name = plain.clone().sorted(SearchSort::asc("name"));
    let by_name_desc = plain.clone().sorted(SearchSort::desc("name"));

    let page = manager.search(&plain).await.unwrap();
    assert_eq!(page.items.len(), 2);
    assert_eq!(page.total, Some(2));

    manager.search(&plain).await.unwrap();
    assert_eq!(api.searcher.calls(), 1);

    manager.search(&by_name).await.unwrap();
    manager.search(&by_name_desc).await.unwrap();
    manager.search(&by_name).await.unwrap();
    assert_eq!(api.searcher.calls(), 3);
}

#[tokio::test]
async fn test_search_failure_propagates_and_is_not_cached() {
    let api = api();
    let manager = api.manager(CacheStore::in_memory(), false);
    let params = SearchParams::new("", 10, 0);

    let err: SluiceError = FetchError::Timeout {
        operation: "search".to_string(),
        kind: EntityKind::Dataflow,
        id: "*".to_string(),
        elapsed: Duration::from_secs(30),
    }
    .into();
    api.searcher.fail_with(err.clone());
    assert_eq!(manager.search(&params).await.unwrap_err(), err);

    api.searcher.clear_failure();
    assert_eq!(manager.search(&params).await.unwrap().items.len(), 3);
    assert_eq!(api.searcher.calls(), 2);
}

#[tokio::test]
async fn test_list_all_walks_pages() {
    let api = api();
    let manager = api.manager(CacheStore::in_memory(), false);

    let all = manager.list_all(2).await.unwrap();
    let ids: Vec<&str> = all.iter().map(|d| d.id.as_str()).collect();
    assert_eq!(ids, vec!["1", "2", "3"]);
    // Second page reached the reported total
    assert_eq!(api.searcher.calls(), 2);
}

#[tokio::test]
async fn test_list_all_keeps_paging_past_malformed_record() {
    let mut records: Vec<Value> = (1..=5)
        .map(|i| dataflow_payload(&i.to_string(), &format!("Flow {}", i), &[], &[]))
        .collect();
    records[1] = json!({ "name": "Flow without id" });
    let api = MockApi::new(MockSearcher::new(records), MockFetcher::new(), MockFetcher::new());
    let manager = api.manager(CacheStore::in_memory(), false);

    let all = manager.list_all(2).await.unwrap();
    let ids: Vec<&str> = all.iter().map(|d| d.id.as_str()).collect();
    assert_eq!(ids, vec!["1", "3", "4", "5"]);
    // Offsets 0, 2 and 4; the last page is short
    assert_eq!(api.searcher.calls(), 3);
}

// ============================================================================
// GET BY ID
// ============================================================================

#[tokio::test]
async fn test_get_by_id_merges_enhanced_fields() {
    let api = api();
    let manager = api.manager(CacheStore::in_memory(), true);

    let dual = manager.get_by_id("1").await.unwrap();
    let merged = dual.best_data().unwrap();

    // Primary wins on shared fields
    assert_eq!(merged.name, "Sales ETL");
    assert_eq!(merged.inputs.len(), 1);
    // Secondary-only fields are carried through
    assert!(merged.trigger_settings.is_some());
    assert_eq!(merged.actions.len(), 2);
    assert_eq!(merged.engine_properties.get("partitions").map(String::as_str), Some("8"));
    assert!(dual.has_secondary());
    assert_eq!(
        dual.secondary.as_ref().map(|s| s.name.as_str()),
        Some("Name From Enhanced API")
    );

    let formatted = serde_json::to_value(dual.format_for_output()).unwrap();
    assert!(formatted["primary"].is_object());
    assert!(formatted["secondary"].is_object());
    assert!(formatted["note"].is_string());
}

#[tokio::test]
async fn test_get_by_id_is_served_from_cache() {
    let api = api();
    let manager = api.manager(CacheStore::in_memory(), true);

    let first = manager.get_by_id_read("1").await.unwrap();
    let second = manager.get_by_id_read("1").await.unwrap();

    assert!(first.was_cache_miss());
    assert!(second.was_cache_hit());
    assert_eq!(first.value(), second.value());
    assert_eq!(api.primary.calls(), 1);
    assert_eq!(api.secondary.calls(), 1);
}

#[tokio::test]
async fn test_get_by_id_without_enhanced_access() {
    let api = api();
    let manager = api.manager(CacheStore::in_memory(), false);

    let dual = manager.get_by_id("1").await.unwrap();
    assert!(!dual.has_secondary());
    assert!(dual.best_data().unwrap().trigger_settings.is_none());
    assert_eq!(api.secondary.calls(), 0);
}

#[tokio::test]
async fn test_enhanced_failure_degrades_to_primary() {
    let api = api();
    api.secondary.fail_with(
        FetchError::RequestFailed {
            operation: "get enhanced dataflow".to_string(),
            kind: EntityKind::Dataflow,
            id: "1".to_string(),
            reason: "HTTP 403".to_string(),
        }
        .into(),
    );
    let manager = api.manager(CacheStore::in_memory(), true);

    let dual = manager.get_by_id("1").await.unwrap();
    assert_eq!(dual.best_data().map(|d| d.name.as_str()), Some("Sales ETL"));
    assert!(!dual.has_secondary());
}

#[tokio::test]
async fn test_primary_failure_propagates_unchanged() {
    let api = api();
    let manager = api.manager(CacheStore::in_memory(), true);

    let result = manager.get_by_id("404").await;
    assert_not_found(&result, "404");
}

#[tokio::test]
async fn test_primary_without_id_is_invalid_payload() {
    let api = api();
    api.primary.insert("bad", json!({ "name": "no id here" }));
    let manager = api.manager(CacheStore::in_memory(), false);

    let result = manager.get_by_id("bad").await;
    assert_fetch_error(&result);
    assert!(matches!(
        result,
        Err(SluiceError::Fetch(FetchError::InvalidPayload { .. }))
    ));
}

#[tokio::test]
async fn test_entry_expires_after_entity_ttl() {
    let api = api();
    let (clock, store) = manual_clock_store(Duration::from_secs(300));
    let settings = sluice_test_utils::CacheSettings {
        entity_ttl: Duration::from_secs(60),
        ..Default::default()
    };
    let manager = api.manager(store, false).with_settings(&settings);

    manager.get_by_id("1").await.unwrap();
    clock.advance(Duration::from_secs(59));
    manager.get_by_id("1").await.unwrap();
    assert_eq!(api.primary.calls(), 1);

    clock.advance(Duration::from_secs(2));
    manager.get_by_id("1").await.unwrap();
    assert_eq!(api.primary.calls(), 2);
}

#[tokio::test]
async fn test_read_reports_origin_and_remaining_lifetime() {
    let api = api();
    let (clock, store) = manual_clock_store(Duration::from_secs(300));
    let manager = api.manager(store, false);

    let fetched = manager.get_by_id_read("1").await.unwrap();
    assert!(matches!(fetched.origin(), ReadOrigin::Source { .. }));
    assert_eq!(fetched.expires_in(manager.cache().now()), None);

    clock.advance(Duration::from_secs(100));
    let cached = manager.get_by_id_read("1").await.unwrap();
    assert!(matches!(cached.origin(), ReadOrigin::Cache { .. }));
    assert_eq!(cached.observed_at(), fetched.observed_at());
    assert_eq!(
        cached.expires_in(manager.cache().now()),
        Some(Duration::from_secs(200))
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_misses_coalesce_into_one_fetch() {
    let records = vec![dataflow_payload("1", "Sales ETL", &[], &["sales"])];
    let api = MockApi::new(
        MockSearcher::new(records.clone()),
        MockFetcher::new()
            .with_payload("1", records[0].clone())
            .with_delay(Duration::from_millis(100)),
        MockFetcher::new(),
    );
    let manager = Arc::new(api.manager(CacheStore::in_memory(), false));

    let mut handles = Vec::new();
    for _ in 0..10 {
        let manager = manager.clone();
        handles.push(tokio::spawn(async move { manager.get_by_id("1").await }));
    }
    for handle in handles {
        let dual = handle.await.unwrap().unwrap();
        assert_eq!(dual.best_data().map(|d| d.id.as_str()), Some("1"));
    }

    assert_eq!(api.primary.calls(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_coalesced_waiters_share_the_failure() {
    let api = MockApi::new(
        MockSearcher::default(),
        MockFetcher::new().with_delay(Duration::from_millis(100)),
        MockFetcher::new(),
    );
    let manager = Arc::new(api.manager(CacheStore::in_memory(), false));

    let mut handles = Vec::new();
    for _ in 0..5 {
        let manager = manager.clone();
        handles.push(tokio::spawn(async move { manager.get_by_id("missing").await }));
    }
    for handle in handles {
        assert_not_found(&handle.await.unwrap(), "missing");
    }
    assert_eq!(api.primary.calls(), 1);
}

// ============================================================================
// MUTATIONS
// ============================================================================

#[tokio::test]
async fn test_update_invalidates_entity_and_all_searches() {
    let api = api();
    let store = CacheStore::in_memory();
    let manager = api.manager(store.clone(), false);

    manager.get_by_id("1").await.unwrap();
    manager.get_by_id("2").await.unwrap();
    manager.search(&SearchParams::new("sales", 10, 0)).await.unwrap();
    manager.search(&SearchParams::new("", 10, 0)).await.unwrap();

    let changes = DataflowUpdate {
        name: Some("Sales ETL v2".to_string()),
        ..Default::default()
    };
    let updated = manager.update("1", &changes).await.unwrap();
    assert_eq!(updated.name, "Sales ETL v2");
    assert_eq!(api.mutator.updates(), vec![("1".to_string(), changes)]);

    let entity_1 = DataflowManager::entity_key("1");
    let entity_2 = DataflowManager::entity_key("2");
    assert!(store.get(entity_1.as_str()).await.is_none());
    assert!(store.get(entity_2.as_str()).await.is_some());

    manager.search(&SearchParams::new("sales", 10, 0)).await.unwrap();
    manager.search(&SearchParams::new("", 10, 0)).await.unwrap();
    assert_eq!(api.searcher.calls(), 4);
}

#[tokio::test]
async fn test_execute_invalidates_only_the_entity() {
    let api = api();
    let manager = api.manager(CacheStore::in_memory(), false);
    let params = SearchParams::new("sales", 10, 0);

    manager.get_by_id("1").await.unwrap();
    manager.search(&params).await.unwrap();

    let execution = manager.execute("1").await.unwrap();
    assert_eq!(execution.dataflow_id, "1");
    assert_eq!(execution.state, "RUNNING");
    assert_eq!(api.mutator.executions(), vec!["1".to_string()]);

    manager.get_by_id("1").await.unwrap();
    manager.search(&params).await.unwrap();
    assert_eq!(api.primary.calls(), 2);
    assert_eq!(api.searcher.calls(), 1);
}

#[tokio::test]
async fn test_failed_mutation_keeps_cache() {
    let api = api();
    let manager = api.manager(CacheStore::in_memory(), false);
    manager.get_by_id("1").await.unwrap();

    api.mutator.fail_with(
        FetchError::RequestFailed {
            operation: "update dataflow".to_string(),
            kind: EntityKind::Dataflow,
            id: "1".to_string(),
            reason: "HTTP 500".to_string(),
        }
        .into(),
    );
    let changes = DataflowUpdate {
        enabled: Some(false),
        ..Default::default()
    };
    assert_fetch_error(&manager.update("1", &changes).await);

    manager.get_by_id("1").await.unwrap();
    assert_eq!(api.primary.calls(), 1);
}

#[tokio::test]
async fn test_explicit_invalidate() {
    let api = api();
    let manager = api.manager(CacheStore::in_memory(), false);
    manager.get_by_id("1").await.unwrap();
    manager.invalidate("1").await;
    manager.get_by_id("1").await.unwrap();
    assert_eq!(api.primary.calls(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_update_during_fetch_wins_over_older_result() {
    let api = MockApi::new(
        MockSearcher::default(),
        MockFetcher::new()
            .with_payload("1", dataflow_payload("1", "old name", &[], &["sales"]))
            .with_delay(Duration::from_millis(200)),
        MockFetcher::new(),
    );
    let manager = Arc::new(api.manager(CacheStore::in_memory(), false));

    let older = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.get_by_id("1").await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    api.primary
        .insert("1", dataflow_payload("1", "new name", &[], &["sales"]));
    let changes = DataflowUpdate {
        name: Some("new name".to_string()),
        ..Default::default()
    };
    manager.update("1", &changes).await.unwrap();

    // Issued while the older fetch is still running; must not join it
    let during = manager.get_by_id("1").await.unwrap();
    assert_eq!(during.best_data().map(|d| d.name.as_str()), Some("new name"));

    let older = older.await.unwrap().unwrap();
    assert_eq!(older.best_data().map(|d| d.name.as_str()), Some("old name"));

    let later = manager.get_by_id_read("1").await.unwrap();
    assert!(later.was_cache_hit());
    assert_eq!(
        later.value().best_data().map(|d| d.name.as_str()),
        Some("new name")
    );
    assert_eq!(api.primary.calls(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_search_running_during_update_is_not_cached() {
    let api = MockApi::new(
        MockSearcher::new(vec![dataflow_payload("1", "Sales ETL", &[], &["sales"])])
            .with_delay(Duration::from_millis(100)),
        MockFetcher::new(),
        MockFetcher::new(),
    );
    let manager = Arc::new(api.manager(CacheStore::in_memory(), false));
    let params = SearchParams::new("sales", 10, 0);

    let running = {
        let manager = manager.clone();
        let params = params.clone();
        tokio::spawn(async move { manager.search(&params).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    let changes = DataflowUpdate {
        enabled: Some(false),
        ..Default::default()
    };
    manager.update("1", &changes).await.unwrap();
    running.await.unwrap().unwrap();

    manager.search(&params).await.unwrap();
    assert_eq!(api.searcher.calls(), 2);
}
