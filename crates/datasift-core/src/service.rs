//! Search service
//!
//! Owns the dataset snapshot, the query cache and the extraction backends,
//! and exposes the browse, lookup and natural-language query operations.

use crate::config::Config;
use crate::dataset::{
    CsvLoader, DatasetLoader, DatasetSchema, DatasetSnapshot, SnapshotStore, SqliteLoader,
};
use crate::db::{quote_ident, Row, SqlParam, SqliteStorage, Storage};
use crate::error::{DataSiftError, Result};
use crate::extract::{
    extract_with_fallback, ExtractionSource, ExtractionStrategy, FallbackReason,
    HeuristicExtractor, RemoteExtractor,
};
use crate::llm::{MetricsSnapshot, VLLMClient};
use crate::filter::StructuredFilter;
use crate::search::{
    total_pages, CacheStats, FilterMapper, Page, QueryCache, QuerySpec, ResultAggregator,
    StrategyReport,
};
use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// One page of browse or text search results
#[derive(Debug, Clone, Serialize)]
pub struct SearchPage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    pub page: usize,
    pub limit: usize,
    pub total_pages: usize,
    pub total_count: usize,
    pub data: Vec<Row>,
}

/// Answer to a natural-language query
///
/// Serialized with the dataset's own result keys (`movies`/`movie_count`
/// for movies, `results`/`results_count` otherwise).
#[derive(Debug, Clone)]
pub struct QueryResponse {
    pub query: String,
    pub parsed: StructuredFilter,
    pub extraction_source: ExtractionSource,
    pub fallback_reason: Option<FallbackReason>,
    pub strategies: Vec<StrategyReport>,
    pub fallback_applied: bool,
    pub results: Vec<Row>,
    pub results_key: &'static str,
    pub count_key: &'static str,
}

impl Serialize for QueryResponse {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(8))?;
        map.serialize_entry("query", &self.query)?;
        map.serialize_entry("parsed", &self.parsed)?;
        map.serialize_entry("extraction_source", &self.extraction_source)?;
        map.serialize_entry("fallback_reason", &self.fallback_reason)?;
        map.serialize_entry("strategies", &self.strategies)?;
        map.serialize_entry("fallback_applied", &self.fallback_applied)?;
        map.serialize_entry(self.results_key, &self.results)?;
        map.serialize_entry(self.count_key, &self.results.len())?;
        map.end()
    }
}

/// Health and debug information
#[derive(Debug, Clone, Serialize)]
pub struct SystemStatus {
    pub status: &'static str,
    pub dataset: String,
    pub database: PathBuf,
    pub db_exists: bool,
    pub row_count: usize,
    pub loaded_at: DateTime<Utc>,
    pub fingerprint: Option<String>,
    pub llm_configured: bool,
    pub llm_metrics: Option<MetricsSnapshot>,
    pub cache: CacheStats,
}

pub struct SearchService {
    config: Config,
    snapshots: SnapshotStore,
    cache: QueryCache,
    loader: Box<dyn DatasetLoader>,
    extractor: Option<Arc<dyn ExtractionStrategy>>,
    llm: Option<Arc<VLLMClient>>,
    heuristic: HeuristicExtractor,
}

impl SearchService {
    /// Open the service described by `config`
    ///
    /// A missing database does not fail here; queries report
    /// `StorageUnavailable` until a load succeeds.
    pub fn open(config: Config) -> Result<Self> {
        let loader: Box<dyn DatasetLoader> = match &config.source_csv {
            Some(csv) => Box::new(CsvLoader::new(
                csv.clone(),
                config.database_path.clone(),
                config.dataset,
            )),
            None => Box::new(SqliteLoader::new(
                config.database_path.clone(),
                config.dataset,
            )),
        };

        let llm = if config.llm_service.is_configured() {
            match VLLMClient::new(config.llm_service.clone()) {
                Ok(client) => Some(Arc::new(client)),
                Err(e) => {
                    tracing::warn!("Remote extraction disabled: {}", e);
                    None
                }
            }
        } else {
            None
        };
        let extractor = llm.clone().map(|client| {
            Arc::new(RemoteExtractor::new(client)) as Arc<dyn ExtractionStrategy>
        });

        let mut service = Self::with_parts(config, loader, extractor);
        service.llm = llm;
        Ok(service)
    }

    /// Build a service from explicit collaborators
    pub fn with_parts(
        config: Config,
        loader: Box<dyn DatasetLoader>,
        extractor: Option<Arc<dyn ExtractionStrategy>>,
    ) -> Self {
        let initial = if config.database_path.exists() {
            SqliteLoader::new(config.database_path.clone(), config.dataset).load()
        } else {
            loader.load()
        };

        let snapshot = initial.unwrap_or_else(|e| {
            tracing::warn!("No dataset loaded from {}: {}", loader.describe(), e);
            DatasetSnapshot {
                kind: config.dataset,
                database_path: config.database_path.clone(),
                row_count: 0,
                fingerprint: None,
                loaded_at: Utc::now(),
            }
        });

        Self {
            cache: QueryCache::with_ttl(config.cache_ttl()),
            snapshots: SnapshotStore::new(snapshot),
            config,
            loader,
            extractor,
            llm: None,
            heuristic: HeuristicExtractor::new(),
        }
    }

    /// Shared LLM client, counted in [`SearchService::status`]
    pub fn llm_client(&self) -> Option<Arc<VLLMClient>> {
        self.llm.clone()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    pub fn snapshot(&self) -> Arc<DatasetSnapshot> {
        self.snapshots.current()
    }

    pub fn schema(&self) -> &'static DatasetSchema {
        self.snapshot().schema()
    }

    /// Storage bound to the current snapshot
    pub fn storage(&self) -> SqliteStorage {
        let snapshot = self.snapshot();
        SqliteStorage::new(snapshot.database_path.clone(), snapshot.schema())
    }

    /// Default first page
    pub fn first_page(&self) -> Page {
        Page::first(self.config.default_page_size)
    }

    /// Filtered, paginated listing
    pub fn browse(&self, filter: &StructuredFilter, page: Page) -> Result<SearchPage> {
        let storage = self.storage();
        let mapper = FilterMapper::new(storage.schema());
        let spec = mapper.spec_for(filter, page)?;

        let data = self
            .cache
            .get_or_compute(&spec.signature(), || storage.execute(&spec))?;
        let total_count = self.cached_count(&storage, &spec)?;

        Ok(SearchPage {
            query: None,
            page: page.page,
            limit: spec.limit,
            total_pages: total_pages(total_count, spec.limit),
            total_count,
            data,
        })
    }

    /// Keyword search over the dataset's text columns
    pub fn text_search(&self, q: &str, page: Page) -> Result<SearchPage> {
        let q = q.trim();
        if q.is_empty() {
            return Err(DataSiftError::InvalidInput(
                "Search query must not be empty".to_string(),
            ));
        }
        let filter = StructuredFilter::new().with("keyword", q);
        let mut result = self.browse(&filter, page)?;
        result.query = Some(q.to_string());
        Ok(result)
    }

    /// Single row by primary key
    pub fn get(&self, id: i64) -> Result<Row> {
        let storage = self.storage();
        let schema = storage.schema();
        let sql = format!(
            "SELECT * FROM {} WHERE {} = ?",
            quote_ident(schema.table),
            quote_ident(schema.primary_key)
        );
        storage
            .run_sql(&sql, &[SqlParam::Integer(id)])?
            .into_iter()
            .next()
            .ok_or_else(|| DataSiftError::NotFound(format!("{} {}", schema.kind, id)))
    }

    /// Natural-language query: extract, plan, execute, merge
    pub async fn query(&self, text: &str) -> Result<QueryResponse> {
        let text = text.trim();
        if text.is_empty() {
            return Err(DataSiftError::InvalidInput(
                "Query must not be empty".to_string(),
            ));
        }

        let storage = self.storage();
        let schema = storage.schema();
        let extraction =
            extract_with_fallback(self.extractor.as_deref(), &self.heuristic, text, schema).await;

        let mapper = FilterMapper::new(schema);
        let filter = drop_invalid_fields(&mapper, extraction.filter);
        let plan = mapper.plan(&filter, self.first_page(), schema.composition)?;

        let aggregated = ResultAggregator::new(&storage, &self.cache).run(&plan)?;
        tracing::info!(
            "Query '{}' ({}) returned {} rows",
            text,
            extraction.source,
            aggregated.rows.len()
        );

        Ok(QueryResponse {
            query: text.to_string(),
            parsed: filter,
            extraction_source: extraction.source,
            fallback_reason: extraction.fallback_reason,
            strategies: aggregated.strategies,
            fallback_applied: aggregated.fallback_applied,
            results: aggregated.rows,
            results_key: schema.results_key,
            count_key: schema.count_key,
        })
    }

    pub fn status(&self) -> SystemStatus {
        let snapshot = self.snapshot();
        let db_exists = snapshot.database_path.exists();
        let healthy = db_exists && self.storage().verify().is_ok();

        SystemStatus {
            status: if healthy { "ok" } else { "degraded" },
            dataset: snapshot.kind.to_string(),
            database: snapshot.database_path.clone(),
            db_exists,
            row_count: snapshot.row_count,
            loaded_at: snapshot.loaded_at,
            fingerprint: snapshot.fingerprint.clone(),
            llm_configured: self.extractor.is_some(),
            llm_metrics: self.llm.as_ref().map(|client| client.metrics()),
            cache: self.cache.stats(),
        }
    }

    /// Reload the dataset and swap in the new snapshot
    ///
    /// On failure the previous snapshot stays active.
    pub fn refresh(&self) -> Result<Arc<DatasetSnapshot>> {
        match self.loader.load() {
            Ok(snapshot) => {
                tracing::info!(
                    "Loaded {} rows from {}",
                    snapshot.row_count,
                    self.loader.describe()
                );
                self.snapshots.swap(snapshot);
                // Cached rows belong to the replaced snapshot
                self.cache.clear();
                Ok(self.snapshots.current())
            }
            Err(e) => {
                tracing::warn!(
                    "Refresh from {} failed, keeping previous snapshot: {}",
                    self.loader.describe(),
                    e
                );
                self.cache.cleanup();
                Err(e)
            }
        }
    }

    /// Run [`SearchService::refresh`] every `interval` on a background task
    pub fn spawn_refresh(self: Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let service = Arc::clone(&self);
                if let Err(e) = tokio::task::spawn_blocking(move || service.refresh()).await {
                    tracing::warn!("Refresh task panicked: {}", e);
                }
            }
        })
    }

    fn cached_count(&self, storage: &SqliteStorage, spec: &QuerySpec) -> Result<usize> {
        let rows = self.cache.get_or_compute(&spec.count_signature(), || {
            let mut row = Row::new();
            row.insert("count".to_string(), storage.count(spec)?.into());
            Ok(vec![row])
        })?;
        Ok(rows
            .first()
            .and_then(|r| r.get("count"))
            .and_then(|v| v.as_u64())
            .unwrap_or(0) as usize)
    }
}

/// Remove fields the mapper rejects so one bad value does not sink the query
fn drop_invalid_fields(mapper: &FilterMapper, mut filter: StructuredFilter) -> StructuredFilter {
    for _ in 0..filter.len() {
        match mapper.validate(&filter) {
            Err(DataSiftError::QueryMapping { field, reason }) => {
                tracing::warn!("Dropping extracted field '{}': {}", field, reason);
                filter.remove(&field);
            }
            _ => break,
        }
    }
    filter
}
