//! Cache-aware dataflow manager.
//!
//! [`DataflowManager`] fronts the remote API with the shared [`CacheStore`].
//! Reads go cache first, then to the collaborators, with concurrent misses
//! for the same key coalesced into one fetch. Mutations go straight to the
//! collaborator and then invalidate every cache entry they can affect.
//!
//! # Cache layout
//!
//! | Entry | Key | Invalidated by |
//! |-------|-----|----------------|
//! | search page | `dataflow-search:{canonical params}` | `update` |
//! | merged record | `dual:dataflow:<id>` | `update`, `execute`, `invalidate` |
//!
//! Invalidation also detaches any fetch still running for the affected keys
//! and bumps their generation. A fetch that began before the mutation still
//! answers the callers already waiting on it, but its result is not cached
//! and later callers start a new fetch.

use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use serde::Serialize;
use serde_json::{json, Value};
use sluice_core::{
    dataflow_from_primary, dataflow_from_secondary, execution_from_payload, merge,
    search_page_from_payload, CacheSettings, Dataflow, DataflowUpdate, DualResponse, EntityKind,
    Execution, FetchError, SearchPage, SearchParams, SluiceError, SluiceResult, ValidationError,
};
use sluice_storage::{CacheKey, CacheRead, CacheStore, DEFAULT_TTL};

use crate::collaborators::{DataflowMutator, DataflowSearcher, EntityFetcher};
use crate::generation::Generations;
use crate::single_flight::SingleFlight;

const KIND: EntityKind = EntityKind::Dataflow;

/// Entity manager for dataflows.
#[derive(Clone)]
pub struct DataflowManager {
    cache: CacheStore,
    searcher: Arc<dyn DataflowSearcher>,
    primary: Arc<dyn EntityFetcher>,
    /// Enhanced-access fetcher. Absent unless the caller has configured it.
    secondary: Option<Arc<dyn EntityFetcher>>,
    mutator: Arc<dyn DataflowMutator>,
    entity_ttl: Duration,
    search_ttl: Duration,
    entity_flights: Arc<SingleFlight<DualResponse<Dataflow>>>,
    search_flights: Arc<SingleFlight<SearchPage>>,
    generations: Arc<Generations>,
}

impl std::fmt::Debug for DataflowManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataflowManager")
            .field("cache", &self.cache)
            .field("has_secondary", &self.secondary.is_some())
            .field("entity_ttl", &self.entity_ttl)
            .field("search_ttl", &self.search_ttl)
            .finish_non_exhaustive()
    }
}

impl DataflowManager {
    /// Create a manager without enhanced access, using the default TTLs.
    pub fn new(
        cache: CacheStore,
        searcher: Arc<dyn DataflowSearcher>,
        primary: Arc<dyn EntityFetcher>,
        mutator: Arc<dyn DataflowMutator>,
    ) -> Self {
        Self {
            cache,
            searcher,
            primary,
            secondary: None,
            mutator,
            entity_ttl: DEFAULT_TTL,
            search_ttl: DEFAULT_TTL,
            entity_flights: Arc::new(SingleFlight::new()),
            search_flights: Arc::new(SingleFlight::new()),
            generations: Arc::new(Generations::new()),
        }
    }

    /// Enable the enhanced (secondary) representation.
    pub fn with_secondary(mut self, fetcher: Arc<dyn EntityFetcher>) -> Self {
        self.secondary = Some(fetcher);
        self
    }

    /// Take entry TTLs from configuration.
    pub fn with_settings(mut self, settings: &CacheSettings) -> Self {
        self.entity_ttl = settings.entity_ttl;
        self.search_ttl = settings.search_ttl;
        self
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    pub fn has_secondary(&self) -> bool {
        self.secondary.is_some()
    }

    // ========================================================================
    // KEYS
    // ========================================================================

    /// Cache key of one search page. Every parameter, including both sort
    /// fields, takes part in the key.
    pub fn search_key(params: &SearchParams) -> CacheKey {
        let (sort_field, sort_order) = match &params.sort {
            Some(sort) => (json!(sort.field), json!(sort.order.as_str())),
            None => (Value::Null, Value::Null),
        };
        CacheKey::generate(
            &KIND.search_namespace(),
            [
                ("query", json!(params.query)),
                ("limit", json!(params.limit)),
                ("offset", json!(params.offset)),
                ("sort_field", sort_field),
                ("sort_order", sort_order),
            ],
        )
    }

    pub fn entity_key(id: &str) -> CacheKey {
        CacheKey::dual(KIND, id)
    }

    // ========================================================================
    // SEARCH
    // ========================================================================

    /// Search dataflows, serving repeated identical searches from cache.
    pub async fn search(&self, params: &SearchParams) -> SluiceResult<SearchPage> {
        self.search_read(params).await.map(CacheRead::into_value)
    }

    /// Like [`search`](Self::search), reporting whether the page came from cache.
    pub async fn search_read(&self, params: &SearchParams) -> SluiceResult<CacheRead<SearchPage>> {
        if params.limit == 0 {
            return Err(ValidationError::InvalidValue {
                field: "limit".to_string(),
                reason: "must be greater than zero".to_string(),
            }
            .into());
        }

        let key = Self::search_key(params);
        if let Some(read) = self.cache.get_read::<SearchPage>(key.as_str()).await {
            return Ok(read);
        }

        let query = params.query.clone();
        let namespace = KIND.search_namespace();
        let page = self
            .search_flights
            .run(
                key.as_str(),
                || cancelled("search", &query),
                || async {
                    let generation = self.generations.current(&namespace);
                    let raw = self.searcher.search(params).await?;
                    let page = search_page_from_payload(&raw);
                    self.store_if_current(
                        key.as_str(),
                        &namespace,
                        generation,
                        &page,
                        self.search_ttl,
                    )
                    .await;
                    Ok(page)
                },
            )
            .await?;

        Ok(CacheRead::from_source(page, self.cache.now()))
    }

    /// Walk every search page of `page_size` and collect all dataflows.
    ///
    /// Paging follows the number of records the API returned, so records
    /// dropped as malformed neither end the walk early nor shift the offset.
    /// Stops at the first short page, or once the reported total is reached.
    pub async fn list_all(&self, page_size: usize) -> SluiceResult<Vec<Dataflow>> {
        let mut all = Vec::new();
        let mut offset = 0;
        loop {
            let page = self
                .search(&SearchParams::new("", page_size, offset))
                .await?;
            let fetched = page.fetched;
            if fetched > page.items.len() {
                tracing::warn!(
                    offset,
                    skipped = fetched - page.items.len(),
                    "listing page contained unmappable records"
                );
            }
            all.extend(page.items);
            offset += fetched;

            let reached_total = page.total.is_some_and(|total| offset as u64 >= total);
            if fetched < page_size || reached_total {
                break;
            }
        }
        tracing::debug!(count = all.len(), "listed all dataflows");
        Ok(all)
    }

    // ========================================================================
    // SINGLE ENTITY
    // ========================================================================

    /// Get the merged view of one dataflow.
    pub async fn get_by_id(&self, id: &str) -> SluiceResult<DualResponse<Dataflow>> {
        self.get_by_id_read(id).await.map(CacheRead::into_value)
    }

    /// Like [`get_by_id`](Self::get_by_id), reporting whether the record came from cache.
    pub async fn get_by_id_read(
        &self,
        id: &str,
    ) -> SluiceResult<CacheRead<DualResponse<Dataflow>>> {
        require_id(id)?;
        let key = Self::entity_key(id);
        if let Some(read) = self
            .cache
            .get_read::<DualResponse<Dataflow>>(key.as_str())
            .await
        {
            return Ok(read);
        }

        let dual = self
            .entity_flights
            .run(
                key.as_str(),
                || cancelled("get dataflow", id),
                || async {
                    let generation = self.generations.current(key.as_str());
                    let dual = self.fetch_dual(id).await?;
                    self.store_if_current(
                        key.as_str(),
                        key.as_str(),
                        generation,
                        &dual,
                        self.entity_ttl,
                    )
                    .await;
                    Ok(dual)
                },
            )
            .await?;

        Ok(CacheRead::from_source(dual, self.cache.now()))
    }

    /// Cache a fetched value unless its generation was bumped while the fetch
    /// ran. The generation is checked again after the write, so an
    /// invalidation that lands between the check and the write still wins.
    async fn store_if_current<T: Serialize>(
        &self,
        key: &str,
        generation_key: &str,
        generation: u64,
        value: &T,
        ttl: Duration,
    ) {
        if !self.generations.is_current(generation_key, generation) {
            tracing::debug!(key, "fetch predates an invalidation; not caching");
            return;
        }
        self.cache.set_as(key, value, Some(ttl)).await;
        if !self.generations.is_current(generation_key, generation) {
            self.cache.invalidate(key).await;
        }
    }

    async fn fetch_dual(&self, id: &str) -> SluiceResult<DualResponse<Dataflow>> {
        let (primary, secondary) = tokio::join!(
            self.primary.fetch(KIND, id),
            self.fetch_secondary(id)
        );

        let raw = primary?;
        let primary = dataflow_from_primary(&raw).map_err(|e| FetchError::InvalidPayload {
            operation: "get dataflow".to_string(),
            kind: KIND,
            id: id.to_string(),
            reason: e.to_string(),
        })?;

        let dual = merge(Some(primary), secondary);
        if !dual.enhanced_fields.is_empty() {
            tracing::debug!(entity_id = id, fields = ?dual.enhanced_fields, "merged enhanced fields");
        }
        Ok(dual)
    }

    /// Fetch the enhanced representation. Any problem degrades to `None`.
    async fn fetch_secondary(&self, id: &str) -> Option<Dataflow> {
        let fetcher = self.secondary.as_ref()?;
        let raw = match fetcher.fetch(KIND, id).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(entity_id = id, error = %e, "enhanced fetch failed; using primary only");
                return None;
            }
        };
        match dataflow_from_secondary(&raw) {
            Ok(dataflow) => Some(dataflow),
            Err(e) => {
                tracing::warn!(entity_id = id, error = %e, "unusable enhanced payload; using primary only");
                None
            }
        }
    }

    // ========================================================================
    // MUTATIONS
    // ========================================================================

    /// Apply `changes` to a dataflow and return the updated record.
    ///
    /// On success the record's own entry and every cached search page are
    /// invalidated, since the change may move the dataflow between listings.
    pub async fn update(&self, id: &str, changes: &DataflowUpdate) -> SluiceResult<Dataflow> {
        require_id(id)?;
        if changes.is_empty() {
            return Err(ValidationError::RequiredFieldMissing {
                field: "changes".to_string(),
            }
            .into());
        }

        let raw = self.mutator.update(id, changes).await?;
        self.invalidate(id).await;
        self.invalidate_searches().await;

        dataflow_from_primary(&raw).map_err(|e| {
            FetchError::InvalidPayload {
                operation: "update dataflow".to_string(),
                kind: KIND,
                id: id.to_string(),
                reason: e.to_string(),
            }
            .into()
        })
    }

    /// Start a run. Only the dataflow's own entry is invalidated.
    pub async fn execute(&self, id: &str) -> SluiceResult<Execution> {
        require_id(id)?;
        let raw = self.mutator.execute(id).await?;
        self.invalidate(id).await;

        execution_from_payload(id, &raw).map_err(|e| {
            FetchError::InvalidPayload {
                operation: "execute dataflow".to_string(),
                kind: KIND,
                id: id.to_string(),
                reason: e.to_string(),
            }
            .into()
        })
    }

    /// Drop the cached record for `id` and detach any fetch of it in flight.
    pub async fn invalidate(&self, id: &str) {
        let key = Self::entity_key(id);
        self.generations.bump(key.as_str());
        if self.entity_flights.forget(key.as_str()) {
            tracing::debug!(entity_id = id, "detached in-flight fetch");
        }
        self.cache.invalidate(key.as_str()).await;
    }

    /// Drop every cached search page and detach searches in flight.
    pub async fn invalidate_searches(&self) -> u64 {
        let namespace = KIND.search_namespace();
        self.generations.bump(&namespace);
        self.search_flights.forget_all();
        let pattern = format!("^{}", regex::escape(&namespace));
        match Regex::new(&pattern) {
            Ok(pattern) => self.cache.invalidate_pattern(&pattern).await,
            Err(e) => {
                tracing::warn!(error = %e, "could not build search invalidation pattern");
                0
            }
        }
    }
}

fn require_id(id: &str) -> Result<(), SluiceError> {
    if id.trim().is_empty() {
        return Err(ValidationError::RequiredFieldMissing {
            field: "id".to_string(),
        }
        .into());
    }
    Ok(())
}

fn cancelled(operation: &str, id: &str) -> SluiceError {
    FetchError::Cancelled {
        operation: operation.to_string(),
        kind: KIND,
        id: id.to_string(),
    }
    .into()
}

// ============================================================================
// TESTS
// ============================================================================
