//! Dataset schemas
//!
//! Every dataset variant has a fixed table layout and a fixed set of
//! filter fields. Column names used in generated SQL only ever come from
//! these static definitions.

pub mod loader;
pub mod snapshot;

use crate::error::{DataSiftError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use loader::{CsvLoader, DatasetLoader, SqliteLoader};
pub use snapshot::{DatasetSnapshot, SnapshotStore};

/// Which tabular dataset the service is running against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DatasetKind {
    #[default]
    News,
    Movies,
    Reviews,
}

impl DatasetKind {
    pub fn schema(self) -> &'static DatasetSchema {
        match self {
            DatasetKind::News => &NEWS,
            DatasetKind::Movies => &MOVIES,
            DatasetKind::Reviews => &REVIEWS,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DatasetKind::News => "news",
            DatasetKind::Movies => "movies",
            DatasetKind::Reviews => "reviews",
        }
    }
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DatasetKind {
    type Err = DataSiftError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "news" | "bbc" => Ok(DatasetKind::News),
            "movies" | "movie" | "tmdb" => Ok(DatasetKind::Movies),
            "reviews" | "review" | "amazon" => Ok(DatasetKind::Reviews),
            other => Err(DataSiftError::Config(format!("Unknown dataset: {}", other))),
        }
    }
}

/// SQLite column affinity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Real,
    Text,
}

impl ColumnType {
    pub fn sql_type(self) -> &'static str {
        match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::Real => "REAL",
            ColumnType::Text => "TEXT",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ColumnDef {
    pub name: &'static str,
    pub ty: ColumnType,
}

const fn col(name: &'static str, ty: ColumnType) -> ColumnDef {
    ColumnDef { name, ty }
}

/// Value type accepted by a filter field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Text,
    Integer,
    Number,
}

/// How a filter field becomes a predicate
#[derive(Debug, Clone, Copy)]
pub enum FieldKind {
    /// Free-text keyword, substring match over one or more columns
    Keyword { columns: &'static [&'static str] },
    /// Enumerated value, case-insensitive equality
    Category {
        column: &'static str,
        allowed: &'static [&'static str],
    },
    /// Person name: exact match first, then substring, then fuzzy
    Entity {
        column: &'static str,
        multi_valued: bool,
    },
    /// Case-insensitive substring over one or more columns
    Substring { columns: &'static [&'static str] },
    AtLeast { column: &'static str },
    AtMost { column: &'static str },
    /// Four digit year matched against the prefix of a date column
    Year { column: &'static str },
    /// positive / negative / neutral mapped onto a score column
    Sentiment { column: &'static str },
    /// Page size override, no predicate
    Limit,
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub value_type: ValueType,
    pub kind: FieldKind,
    pub description: &'static str,
}

/// How multiple strategies inside one filter are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompositionPolicy {
    /// All predicates ANDed into one query, staged fallback drops the keyword
    Conjunctive,
    /// One query per strategy, merged in priority order
    Union,
}

/// Columns used by the agent's follow-up and analysis tools
#[derive(Debug, Clone, Copy)]
pub struct AnalysisColumns {
    /// Column follow-up keys are looked up in
    pub key_column: &'static str,
    /// Regex that finds keys inside a follow-up instruction
    pub key_pattern: &'static str,
    /// Column whose value distribution is reported
    pub distribution_column: &'static str,
    /// Long text column used for length statistics
    pub text_column: &'static str,
}

#[derive(Debug)]
pub struct DatasetSchema {
    pub kind: DatasetKind,
    pub table: &'static str,
    pub primary_key: &'static str,
    pub columns: &'static [ColumnDef],
    pub fields: &'static [FieldSpec],
    pub composition: CompositionPolicy,
    pub analysis: AnalysisColumns,
    /// Key used for the result array in query responses
    pub results_key: &'static str,
    /// Key used for the result count in query responses
    pub count_key: &'static str,
    /// Worked example for the extraction prompt: (query, expected JSON)
    pub example: (&'static str, &'static str),
}

impl DatasetSchema {
    pub fn field(&self, name: &str) -> Option<&'static FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn column(&self, name: &str) -> Option<&'static ColumnDef> {
        self.columns.iter().find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Field that must be non-empty for a remote extraction to be accepted
    pub fn required_field(&self) -> &'static str {
        "keyword"
    }

    /// `CREATE TABLE` statement for this dataset
    pub fn create_table_sql(&self) -> String {
        let cols: Vec<String> = self
            .columns
            .iter()
            .map(|c| {
                if c.name == self.primary_key {
                    format!("{} INTEGER PRIMARY KEY", c.name)
                } else {
                    format!("{} {}", c.name, c.ty.sql_type())
                }
            })
            .collect();
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
            self.table,
            cols.join(",\n    ")
        )
    }
}

pub const NEWS_CATEGORIES: &[&str] = &["business", "entertainment", "politics", "sport", "tech"];

static NEWS: DatasetSchema = DatasetSchema {
    kind: DatasetKind::News,
    table: "news",
    primary_key: "id",
    columns: &[
        col("id", ColumnType::Integer),
        col("category", ColumnType::Text),
        col("title", ColumnType::Text),
        col("text", ColumnType::Text),
    ],
    fields: &[
        FieldSpec {
            name: "category",
            value_type: ValueType::Text,
            kind: FieldKind::Category {
                column: "category",
                allowed: NEWS_CATEGORIES,
            },
            description: "News category, one of: business, entertainment, politics, sport, tech",
        },
        FieldSpec {
            name: "keyword",
            value_type: ValueType::Text,
            kind: FieldKind::Keyword {
                columns: &["title", "text"],
            },
            description: "Main topic keyword to look for in the article title or body",
        },
        FieldSpec {
            name: "limit",
            value_type: ValueType::Integer,
            kind: FieldKind::Limit,
            description: "Number of articles requested",
        },
    ],
    composition: CompositionPolicy::Conjunctive,
    analysis: AnalysisColumns {
        key_column: "id",
        key_pattern: r"\b\d+\b",
        distribution_column: "category",
        text_column: "text",
    },
    results_key: "results",
    count_key: "results_count",
    example: (
        "latest tech news about smartphones",
        r#"{"category": "tech", "keyword": "smartphones"}"#,
    ),
};

static MOVIES: DatasetSchema = DatasetSchema {
    kind: DatasetKind::Movies,
    table: "movies",
    primary_key: "id",
    columns: &[
        col("id", ColumnType::Integer),
        col("title", ColumnType::Text),
        col("overview", ColumnType::Text),
        col("release_date", ColumnType::Text),
        col("genres", ColumnType::Text),
        col("director", ColumnType::Text),
        col("actors", ColumnType::Text),
        col("vote_average", ColumnType::Real),
        col("revenue", ColumnType::Integer),
        col("runtime", ColumnType::Integer),
    ],
    fields: &[
        FieldSpec {
            name: "keyword",
            value_type: ValueType::Text,
            kind: FieldKind::Keyword {
                columns: &["title", "overview"],
            },
            description: "Keyword to look for in the movie title or overview",
        },
        FieldSpec {
            name: "actor",
            value_type: ValueType::Text,
            kind: FieldKind::Entity {
                column: "actors",
                multi_valued: true,
            },
            description: "Name of an actor appearing in the movie",
        },
        FieldSpec {
            name: "director",
            value_type: ValueType::Text,
            kind: FieldKind::Entity {
                column: "director",
                multi_valued: false,
            },
            description: "Name of the movie's director",
        },
        FieldSpec {
            name: "year",
            value_type: ValueType::Integer,
            kind: FieldKind::Year {
                column: "release_date",
            },
            description: "Release year (four digits)",
        },
        FieldSpec {
            name: "genre",
            value_type: ValueType::Text,
            kind: FieldKind::Substring {
                columns: &["genres"],
            },
            description: "Genre such as action, comedy, drama, horror",
        },
        FieldSpec {
            name: "min_rating",
            value_type: ValueType::Number,
            kind: FieldKind::AtLeast {
                column: "vote_average",
            },
            description: "Minimum average vote (0-10)",
        },
        FieldSpec {
            name: "limit",
            value_type: ValueType::Integer,
            kind: FieldKind::Limit,
            description: "Number of movies requested",
        },
    ],
    composition: CompositionPolicy::Union,
    analysis: AnalysisColumns {
        key_column: "id",
        key_pattern: r"\b\d+\b",
        distribution_column: "vote_average",
        text_column: "overview",
    },
    results_key: "movies",
    count_key: "movie_count",
    example: (
        "action movies directed by Christopher Nolan",
        r#"{"director": "Christopher Nolan", "genre": "action"}"#,
    ),
};

static REVIEWS: DatasetSchema = DatasetSchema {
    kind: DatasetKind::Reviews,
    table: "Reviews",
    primary_key: "Id",
    columns: &[
        col("Id", ColumnType::Integer),
        col("ProductId", ColumnType::Text),
        col("UserId", ColumnType::Text),
        col("ProfileName", ColumnType::Text),
        col("HelpfulnessNumerator", ColumnType::Integer),
        col("HelpfulnessDenominator", ColumnType::Integer),
        col("Score", ColumnType::Integer),
        col("Time", ColumnType::Integer),
        col("Summary", ColumnType::Text),
        col("Text", ColumnType::Text),
    ],
    fields: &[
        FieldSpec {
            name: "keyword",
            value_type: ValueType::Text,
            kind: FieldKind::Keyword {
                columns: &["Text", "Summary"],
            },
            description: "Keyword in the review",
        },
        FieldSpec {
            name: "min_score",
            value_type: ValueType::Integer,
            kind: FieldKind::AtLeast { column: "Score" },
            description: "Minimum rating (1-5)",
        },
        FieldSpec {
            name: "max_score",
            value_type: ValueType::Integer,
            kind: FieldKind::AtMost { column: "Score" },
            description: "Maximum rating (1-5)",
        },
        FieldSpec {
            name: "product",
            value_type: ValueType::Text,
            kind: FieldKind::Substring {
                columns: &["ProductId"],
            },
            description: "Specific product name or ID",
        },
        FieldSpec {
            name: "user",
            value_type: ValueType::Text,
            kind: FieldKind::Substring {
                columns: &["UserId", "ProfileName"],
            },
            description: "Specific user name or ID",
        },
        FieldSpec {
            name: "sentiment",
            value_type: ValueType::Text,
            kind: FieldKind::Sentiment { column: "Score" },
            description: "Sentiment orientation (positive, negative, neutral)",
        },
        FieldSpec {
            name: "limit",
            value_type: ValueType::Integer,
            kind: FieldKind::Limit,
            description: "Number of reviews requested",
        },
    ],
    composition: CompositionPolicy::Conjunctive,
    analysis: AnalysisColumns {
        key_column: "ProductId",
        key_pattern: r"\b[A-Z0-9]{10}\b",
        distribution_column: "Score",
        text_column: "Text",
    },
    results_key: "results",
    count_key: "results_count",
    example: (
        "Find 5-star chocolate reviews",
        r#"{"keyword": "chocolate", "min_score": 5, "max_score": 5}"#,
    ),
};
