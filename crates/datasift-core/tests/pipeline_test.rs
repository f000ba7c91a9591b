//! End-to-end tests for the query pipeline
//!
//! Tests:
//! 1. Remote extraction to filtered review results
//! 2. Dataset-specific response keys for movies
//! 3. Entity relaxation (exact, substring, fuzzy) on movie people
//! 4. Dedup across union strategies
//! 5. Staged fallback when the keyword matches nothing
//! 6. Query cache reuse across identical plans

use async_trait::async_trait;
use datasift_core::db::TableInfo;
use datasift_core::search::{MatchLevel, STRATEGY_FIELD};
use datasift_core::{
    ChatMessage, Config, CsvLoader, DatasetKind, DatasetLoader, FilterMapper, LLMClient, Page,
    QuerySpec, RemoteExtractor, ResponseFormat, ResultAggregator, Row, SearchService, SqlParam,
    SqliteStorage, Storage, StructuredFilter,
};
use datasift_core::{DatasetSchema, QueryCache, Result};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

const NEWS_CSV: &str = "id,category,title,text
1,tech,Quantum chips arrive,New quantum processors ship this year
2,sport,Cup final,The final ended in a draw
3,tech,Phone sales slow,Smartphone sales slowed in the last quarter
4,business,Markets rally,Stocks rose on strong earnings
";

const MOVIES_CSV: &str = r#"id,title,overview,release_date,genres,director,cast,vote_average,revenue,runtime
1,Inception,A thief who steals corporate secrets through dream-sharing technology,2010-07-15,"Action, Science Fiction",Christopher Nolan,"Leonardo DiCaprio, Joseph Gordon-Levitt",8.3,825532764,148
2,Interstellar,Explorers travel through a wormhole in space,2014-11-05,"Adventure, Drama",Christopher Nolan,"Matthew McConaughey, Anne Hathaway",8.1,677471339,169
3,The Revenant,A frontiersman on a fur trading expedition fights for survival,2015-12-25,"Western, Drama",Alejandro Inarritu,"Leonardo DiCaprio, Tom Hardy",7.3,532950503,156
4,Dreamgirls,A trio of singers dream of stardom,2006-12-25,"Drama, Music",Bill Condon,"Jamie Foxx, Beyonce Knowles",6.5,154937680,130
"#;

const REVIEWS_CSV: &str = "Id,ProductId,UserId,ProfileName,HelpfulnessNumerator,HelpfulnessDenominator,Score,Time,Summary,Text
1,B001E4KFG0,A1,alice,1,1,5,1303862400,Great chocolate,This dark chocolate is excellent
2,B00813GRG4,A2,bob,0,0,1,1346976000,Bad chocolate,The chocolate arrived melted
3,B000LQOCH0,A3,carol,1,1,5,1219017600,Tasty tea,Great green tea
4,B000UA0QIQ,A4,dan,3,3,5,1307923200,Chocolate bliss,Chocolate bar was perfect
";

/// LLM stand-in that always answers with the same text
struct CannedClient(String);

#[async_trait]
impl LLMClient for CannedClient {
    async fn chat_completion(
        &self,
        _messages: Vec<ChatMessage>,
        _format: ResponseFormat,
    ) -> Result<String> {
        Ok(self.0.clone())
    }

    fn model_name(&self) -> &str {
        "canned"
    }
}

/// Storage wrapper counting executed specs
struct CountingStorage {
    inner: SqliteStorage,
    executed: AtomicUsize,
}

impl Storage for CountingStorage {
    fn schema(&self) -> &'static DatasetSchema {
        self.inner.schema()
    }

    fn execute(&self, spec: &QuerySpec) -> Result<Vec<Row>> {
        self.executed.fetch_add(1, Ordering::SeqCst);
        self.inner.execute(spec)
    }

    fn count(&self, spec: &QuerySpec) -> Result<usize> {
        self.inner.count(spec)
    }

    fn run_sql(&self, sql: &str, params: &[SqlParam]) -> Result<Vec<Row>> {
        self.inner.run_sql(sql, params)
    }

    fn table_info(&self) -> Result<Vec<TableInfo>> {
        self.inner.table_info()
    }

    fn distinct_values(&self, column: &str) -> Result<Vec<String>> {
        self.inner.distinct_values(column)
    }
}

fn load(dir: &Path, kind: DatasetKind, csv: &str) -> PathBuf {
    let csv_path = dir.join(format!("{}.csv", kind));
    std::fs::write(&csv_path, csv).unwrap();
    let db_path = dir.join(format!("{}.sqlite", kind));
    CsvLoader::new(&csv_path, &db_path, kind).load().unwrap();
    db_path
}

fn service_with_reply(dir: &TempDir, kind: DatasetKind, csv: &str, reply: &str) -> SearchService {
    let db_path = load(dir.path(), kind, csv);
    let config = Config {
        dataset: kind,
        database_path: db_path.clone(),
        source_csv: None,
        ..Default::default()
    };
    let extractor = RemoteExtractor::new(Arc::new(CannedClient(reply.to_string())));
    SearchService::with_parts(
        config,
        Box::new(datasift_core::SqliteLoader::new(db_path, kind)),
        Some(Arc::new(extractor)),
    )
}

fn ids(rows: &[Row], key: &str) -> Vec<i64> {
    rows.iter().map(|r| r[key].as_i64().unwrap()).collect()
}

#[tokio::test]
async fn test_five_star_chocolate_reviews() {
    let dir = TempDir::new().unwrap();
    let svc = service_with_reply(
        &dir,
        DatasetKind::Reviews,
        REVIEWS_CSV,
        r#"{"keyword": "chocolate", "min_score": 5, "max_score": 5}"#,
    );

    let response = svc.query("Find 5-star chocolate reviews").await.unwrap();
    assert_eq!(ids(&response.results, "Id"), vec![4, 1]);
    for row in &response.results {
        assert_eq!(row["Score"], json!(5));
        let text = format!("{} {}", row["Summary"], row["Text"]).to_lowercase();
        assert!(text.contains("chocolate"));
    }

    let body = serde_json::to_value(&response).unwrap();
    assert_eq!(body["extraction_source"], json!("remote"));
    assert_eq!(body["results_count"], json!(2));
    assert_eq!(body["parsed"]["min_score"], json!(5));
}

#[tokio::test]
async fn test_unknown_director_gives_empty_movie_list() {
    let dir = TempDir::new().unwrap();
    let svc = service_with_reply(
        &dir,
        DatasetKind::Movies,
        MOVIES_CSV,
        r#"{"keyword": "xyzzy", "director": "Zzyzx Quormbly"}"#,
    );

    let response = svc.query("xyzzy movies by Zzyzx Quormbly").await.unwrap();
    let body = serde_json::to_value(&response).unwrap();
    assert_eq!(body["movie_count"], json!(0));
    assert_eq!(body["movies"], json!([]));
    assert!(body.get("results").is_none());
    assert_eq!(body["strategies"][0]["strategy"], json!("director_match"));
    assert_eq!(body["strategies"][0]["entity_match"], json!("no_match"));
}

#[tokio::test]
async fn test_missing_keyword_falls_back_to_heuristic() {
    let dir = TempDir::new().unwrap();
    let svc = service_with_reply(&dir, DatasetKind::News, NEWS_CSV, r#"{"category": "tech"}"#);

    let response = svc.query("tech news about smartphone sales").await.unwrap();
    let body = serde_json::to_value(&response).unwrap();
    assert_eq!(body["extraction_source"], json!("heuristic"));
    assert_eq!(
        body["fallback_reason"],
        json!({ "reason": "empty_required_field", "detail": "keyword" })
    );
    assert_eq!(ids(&response.results, "id"), vec![3]);
}

#[test]
fn test_entity_relaxation_levels() {
    let dir = TempDir::new().unwrap();
    let db = load(dir.path(), DatasetKind::Movies, MOVIES_CSV);
    let schema = DatasetKind::Movies.schema();
    let storage = SqliteStorage::new(db, schema);
    let cache = QueryCache::new();
    let mapper = FilterMapper::new(schema);

    let run = |filter: StructuredFilter| {
        let plan = mapper
            .plan(&filter, Page::default(), schema.composition)
            .unwrap();
        ResultAggregator::new(&storage, &cache).run(&plan).unwrap()
    };

    let exact = run(StructuredFilter::new().with("actor", "leonardo dicaprio"));
    assert_eq!(ids(&exact.rows, "id"), vec![3, 1]);
    assert_eq!(exact.strategies[0].entity_match, Some(MatchLevel::Exact));

    let substring = run(StructuredFilter::new().with("actor", "DiCaprio"));
    assert_eq!(ids(&substring.rows, "id"), vec![3, 1]);
    assert_eq!(substring.strategies[0].entity_match, Some(MatchLevel::Substring));

    let fuzzy = run(StructuredFilter::new().with("director", "Cristopher Nolan"));
    assert_eq!(ids(&fuzzy.rows, "id"), vec![2, 1]);
    assert_eq!(fuzzy.strategies[0].entity_match, Some(MatchLevel::Fuzzy));
    assert_eq!(
        fuzzy.strategies[0].resolved.as_deref(),
        Some("Christopher Nolan")
    );
    assert!(fuzzy
        .rows
        .iter()
        .all(|r| r[STRATEGY_FIELD] == json!("director_match")));
}

#[test]
fn test_union_dedup_keeps_first_strategy() {
    let dir = TempDir::new().unwrap();
    let db = load(dir.path(), DatasetKind::Movies, MOVIES_CSV);
    let schema = DatasetKind::Movies.schema();
    let storage = SqliteStorage::new(db, schema);
    let cache = QueryCache::new();

    let filter = StructuredFilter::new()
        .with("director", "Christopher Nolan")
        .with("keyword", "dream");
    let plan = FilterMapper::new(schema)
        .plan(&filter, Page::default(), schema.composition)
        .unwrap();
    let result = ResultAggregator::new(&storage, &cache).run(&plan).unwrap();

    assert_eq!(ids(&result.rows, "id"), vec![2, 1, 4]);
    assert_eq!(result.rows[1][STRATEGY_FIELD], json!("director_match"));
    assert_eq!(result.rows[2][STRATEGY_FIELD], json!("keyword_search"));
    assert!(!result.fallback_applied);
}

#[tokio::test]
async fn test_staged_fallback_drops_keyword() {
    let dir = TempDir::new().unwrap();
    let db_path = load(dir.path(), DatasetKind::News, NEWS_CSV);
    let config = Config {
        dataset: DatasetKind::News,
        database_path: db_path.clone(),
        source_csv: None,
        ..Default::default()
    };
    let svc = SearchService::with_parts(
        config,
        Box::new(datasift_core::SqliteLoader::new(db_path, DatasetKind::News)),
        None,
    );

    let response = svc.query("tech news about zeppelins").await.unwrap();
    assert!(response.fallback_applied);
    assert_eq!(ids(&response.results, "id"), vec![3, 1]);
    for row in &response.results {
        assert_eq!(row["category"], json!("tech"));
        assert_eq!(row[STRATEGY_FIELD], json!("staged_fallback"));
    }
}

#[test]
fn test_identical_plans_hit_the_cache() {
    let dir = TempDir::new().unwrap();
    let db = load(dir.path(), DatasetKind::News, NEWS_CSV);
    let schema = DatasetKind::News.schema();
    let storage = CountingStorage {
        inner: SqliteStorage::new(db, schema),
        executed: AtomicUsize::new(0),
    };
    let cache = QueryCache::new();

    let filter = StructuredFilter::new().with("category", "sport");
    let plan = FilterMapper::new(schema)
        .plan(&filter, Page::default(), schema.composition)
        .unwrap();

    let first = ResultAggregator::new(&storage, &cache).run(&plan).unwrap();
    let second = ResultAggregator::new(&storage, &cache).run(&plan).unwrap();

    assert_eq!(storage.executed.load(Ordering::SeqCst), 1);
    assert_eq!(ids(&first.rows, "id"), ids(&second.rows, "id"));
    assert_eq!(cache.stats().hits, 1);
}
