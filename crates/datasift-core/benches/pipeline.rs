//! Query pipeline benchmarks
//!
//! Measures performance of:
//! - Heuristic extraction
//! - Filter mapping and planning
//! - Aggregated execution with a warm and a cold cache

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use datasift_core::search::trigram_similarity;
use datasift_core::{
    CsvLoader, DatasetKind, DatasetLoader, FilterMapper, HeuristicExtractor, Page, QueryCache,
    ResultAggregator, SqliteStorage, StructuredFilter,
};
use std::time::Duration;
use tempfile::TempDir;

const QUERIES: &[(&str, DatasetKind)] = &[
    ("latest tech news about quantum computing", DatasetKind::News),
    ("Find 5-star chocolate reviews", DatasetKind::Reviews),
    ("negative reviews for product B001E4KFG0", DatasetKind::Reviews),
    ("top 5 sci-fi movies directed by Christopher Nolan rated above 8", DatasetKind::Movies),
    ("movies starring Leonardo DiCaprio from 2010", DatasetKind::Movies),
];

fn bench_heuristic(c: &mut Criterion) {
    let extractor = HeuristicExtractor::new();
    let mut group = c.benchmark_group("heuristic_extract");

    for (query, kind) in QUERIES {
        group.bench_with_input(BenchmarkId::from_parameter(query), query, |b, q| {
            b.iter(|| extractor.parse(black_box(q), kind.schema()))
        });
    }

    group.finish();
}

fn bench_mapper(c: &mut Criterion) {
    let schema = DatasetKind::Movies.schema();
    let mapper = FilterMapper::new(schema);
    let filter = StructuredFilter::new()
        .with("keyword", "dream")
        .with("director", "Christopher Nolan")
        .with("actor", "Leonardo DiCaprio")
        .with("genre", "action")
        .with("min_rating", 7.5);

    c.bench_function("plan_union_movies", |b| {
        b.iter(|| {
            mapper
                .plan(black_box(&filter), Page::default(), schema.composition)
                .unwrap()
        })
    });
}

fn bench_trigram(c: &mut Criterion) {
    c.bench_function("trigram_similarity", |b| {
        b.iter(|| trigram_similarity(black_box("cristopher nolan"), black_box("christopher nolan")))
    });
}

fn bench_aggregate(c: &mut Criterion) {
    let temp = TempDir::new().unwrap();
    let csv = temp.path().join("news.csv");
    let mut content = String::from("id,category,title,text\n");
    let categories = ["business", "entertainment", "politics", "sport", "tech"];
    for i in 1..=2000 {
        content.push_str(&format!(
            "{},{},Headline {},Body text {} about markets and chips\n",
            i,
            categories[i % categories.len()],
            i,
            i
        ));
    }
    std::fs::write(&csv, content).unwrap();
    let db = temp.path().join("news.sqlite");
    CsvLoader::new(&csv, &db, DatasetKind::News).load().unwrap();

    let schema = DatasetKind::News.schema();
    let storage = SqliteStorage::new(db, schema);
    let filter = StructuredFilter::new()
        .with("category", "tech")
        .with("keyword", "chips");
    let plan = FilterMapper::new(schema)
        .plan(&filter, Page::default(), schema.composition)
        .unwrap();

    let mut group = c.benchmark_group("aggregate");

    let warm = QueryCache::new();
    group.bench_function("warm_cache", |b| {
        b.iter(|| ResultAggregator::new(&storage, &warm).run(black_box(&plan)).unwrap())
    });

    let cold = QueryCache::with_ttl(Duration::ZERO);
    group.bench_function("cold_cache", |b| {
        b.iter(|| ResultAggregator::new(&storage, &cold).run(black_box(&plan)).unwrap())
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_heuristic,
    bench_mapper,
    bench_trigram,
    bench_aggregate
);
criterion_main!(benches);
