//! Markdown output formatter

use super::{display_value, strategy_of, title_of, truncate};
use datasift_core::agent::AgentResponse;
use datasift_core::search::STRATEGY_FIELD;
use datasift_core::{DatasetSchema, QueryResponse, Row, SearchPage};

pub fn format_rows(rows: &[Row], schema: &DatasetSchema) -> String {
    let mut output = String::new();

    for (i, row) in rows.iter().enumerate() {
        output.push_str(&format!("## {}. {}\n\n", i + 1, title_of(row, schema)));
        for (key, value) in row {
            if key == STRATEGY_FIELD {
                continue;
            }
            output.push_str(&format!(
                "- **{}**: {}\n",
                key,
                truncate(&display_value(value).replace('\n', " "), 200)
            ));
        }
        if let Some(tag) = strategy_of(row) {
            output.push_str(&format!("- *Matched by*: `{}`\n", tag));
        }
        output.push_str("\n---\n\n");
    }

    if rows.is_empty() {
        output.push_str("*No results found*\n");
    }

    output
}

pub fn format_record(row: &Row, schema: &DatasetSchema) -> String {
    let mut output = format!("# {}\n\n", title_of(row, schema));
    output.push_str("| Field | Value |\n|---|---|\n");
    for (key, value) in row {
        let cell = display_value(value).replace('|', "\\|").replace('\n', " ");
        output.push_str(&format!("| {} | {} |\n", key, cell));
    }
    output
}

pub fn format_page(page: &SearchPage, schema: &DatasetSchema) -> String {
    let mut output = match &page.query {
        Some(q) => format!("# Search Results for \"{}\"\n\n", q),
        None => String::from("# Search Results\n\n"),
    };
    output.push_str(&format!(
        "Page {} of {}, {} total\n\n",
        page.page, page.total_pages, page.total_count
    ));
    output.push_str(&format_rows(&page.data, schema));
    output
}

pub fn format_query(response: &QueryResponse, schema: &DatasetSchema) -> String {
    let mut output = format!("# {}\n\n", response.query);

    output.push_str(&format!("**Extraction**: {}", response.extraction_source));
    if let Some(reason) = &response.fallback_reason {
        output.push_str(&format!(" ({})", reason));
    }
    output.push_str("\n\n");

    for (field, value) in response.parsed.iter() {
        output.push_str(&format!("- `{}` = {}\n", field, value));
    }
    output.push('\n');

    output.push_str(&format!(
        "**{}**: {}\n\n",
        response.count_key,
        response.results.len()
    ));
    output.push_str(&format_rows(&response.results, schema));
    output
}

pub fn format_agent(response: &AgentResponse) -> String {
    let mut output = format!("# {}\n\n{}\n\n", response.query, response.response);

    if !response.intermediate_steps.is_empty() {
        output.push_str("## Steps\n\n");
        for step in &response.intermediate_steps {
            let tool = step.tool.map(|t| t.to_string()).unwrap_or_else(|| "?".to_string());
            match &step.error {
                Some(e) => output.push_str(&format!("{}. `{}` failed: {}\n", step.index + 1, tool, e)),
                None => output.push_str(&format!("{}. `{}`\n", step.index + 1, tool)),
            }
        }
        output.push('\n');
    }

    let features = &response.insights.advanced_sql_features;
    output.push_str(&format!(
        "*{} steps, tables: {}, SQL features: {}*\n",
        response.insights.query_complexity,
        if response.insights.tables_used.is_empty() {
            "none".to_string()
        } else {
            response.insights.tables_used.join(", ")
        },
        features.names().join(", ")
    ));
    output
}
