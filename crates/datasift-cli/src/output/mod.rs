//! Output formatters

pub mod csv;
pub mod json;
pub mod markdown;
pub mod terminal;

use crate::app::OutputFormat;
use datasift_core::agent::AgentResponse;
use datasift_core::search::STRATEGY_FIELD;
use datasift_core::{DatasetSchema, QueryResponse, Row, SearchPage};
use serde_json::Value;

/// Columns tried, in order, for a row's headline
const TITLE_COLUMNS: &[&str] = &["title", "Summary"];

/// Format a plain list of rows
pub fn format_rows(rows: &[Row], schema: &DatasetSchema, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => json::to_pretty(rows),
        OutputFormat::Csv => csv::format_rows(rows),
        OutputFormat::Md => markdown::format_rows(rows, schema),
        OutputFormat::Cli => terminal::format_rows(rows, schema),
    }
}

/// Format one row with every column
pub fn format_record(row: &Row, schema: &DatasetSchema, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => json::to_pretty(row),
        OutputFormat::Csv => csv::format_rows(std::slice::from_ref(row)),
        OutputFormat::Md => markdown::format_record(row, schema),
        OutputFormat::Cli => terminal::format_record(row),
    }
}

pub fn format_page(page: &SearchPage, schema: &DatasetSchema, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => json::to_pretty(page),
        OutputFormat::Csv => csv::format_rows(&page.data),
        OutputFormat::Md => markdown::format_page(page, schema),
        OutputFormat::Cli => terminal::format_page(page, schema),
    }
}

pub fn format_query(response: &QueryResponse, schema: &DatasetSchema, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => json::to_pretty(response),
        OutputFormat::Csv => csv::format_rows(&response.results),
        OutputFormat::Md => markdown::format_query(response, schema),
        OutputFormat::Cli => terminal::format_query(response, schema),
    }
}

pub fn format_agent(response: &AgentResponse, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => json::to_pretty(response),
        OutputFormat::Csv => csv::format_steps(response),
        OutputFormat::Md => markdown::format_agent(response),
        OutputFormat::Cli => terminal::format_agent(response),
    }
}

/// Plain text rendering of a cell
pub fn display_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Headline of a row: its title-like column, else the primary key
pub fn title_of(row: &Row, schema: &DatasetSchema) -> String {
    TITLE_COLUMNS
        .iter()
        .filter_map(|c| row.get(*c))
        .map(display_value)
        .find(|s| !s.is_empty())
        .unwrap_or_else(|| {
            let id = row.get(schema.primary_key).map(display_value).unwrap_or_default();
            format!("{} {}", schema.kind, id)
        })
}

/// Strategy tag attached by the query pipeline, if any
pub fn strategy_of(row: &Row) -> Option<&str> {
    row.get(STRATEGY_FIELD).and_then(Value::as_str)
}

/// Cut `s` to at most `max` characters, marking the cut
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}
