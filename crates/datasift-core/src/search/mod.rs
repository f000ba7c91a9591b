//! Search engine module
//!
//! Provides:
//! - Structured filter to parameterized SQL mapping
//! - TTL query result caching
//! - Multi-strategy execution with dedup and staged fallback

mod aggregator;
mod cache;
mod mapper;

pub use aggregator::{
    merge, trigram_similarity, Aggregated, MatchLevel, ResultAggregator, StrategyReport,
    FUZZY_THRESHOLD, STRATEGY_FIELD,
};
pub use cache::{CacheStats, QueryCache};
pub use mapper::{
    relax_entity, total_pages, EntityMatch, EntityTarget, FilterMapper, Page, PlannedQuery,
    Predicate, QueryPlan, QuerySpec, Strategy, DEFAULT_PAGE_SIZE,
};
