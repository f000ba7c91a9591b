//! DataSift Core Library
//!
//! Natural-language search over a single tabular dataset (news articles,
//! movies or food reviews) stored in SQLite.
//!
//! # Features
//! - LLM query extraction with a local keyword heuristic fallback
//! - Parameterized SQL mapping of structured filters
//! - TTL query cache and multi-strategy result merging with provenance
//! - Bounded tool-calling agent for free-form analysis

pub mod agent;
pub mod config;
pub mod dataset;
pub mod db;
pub mod error;
pub mod extract;
pub mod filter;
pub mod llm;
pub mod search;
pub mod service;

pub use agent::{
    AgentDecision, AgentOrchestrator, AgentResponse, AgentStep, AgentTool, LlmPlanner,
    StepPlanner, StopReason, ToolRegistry,
};
pub use config::{AgentConfig, Config, LLMServiceConfig};
pub use dataset::{
    CsvLoader, DatasetKind, DatasetLoader, DatasetSchema, DatasetSnapshot, SnapshotStore,
    SqliteLoader,
};
pub use db::{Row, SqlParam, SqliteStorage, Storage};
pub use error::{DataSiftError, Result};
pub use extract::{
    extract_with_fallback, Extraction, ExtractionSource, ExtractionStrategy, FallbackReason,
    HeuristicExtractor, RemoteExtractor,
};
pub use filter::{FilterValue, StructuredFilter};
pub use llm::{ChatMessage, LLMClient, ResponseFormat, VLLMClient};
pub use search::{
    total_pages, FilterMapper, Page, QueryCache, QueryPlan, QuerySpec, ResultAggregator, Strategy,
};
pub use service::{QueryResponse, SearchPage, SearchService, SystemStatus};

/// Default data directory name
pub const DATA_DIR_NAME: &str = "datasift";

/// Default config directory name
pub const CONFIG_DIR_NAME: &str = "datasift";
