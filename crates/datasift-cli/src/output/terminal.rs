//! Terminal output formatter

use super::{display_value, strategy_of, title_of, truncate};
use datasift_core::agent::{AgentResponse, StopReason};
use datasift_core::search::STRATEGY_FIELD;
use datasift_core::{DatasetSchema, QueryResponse, Row, SearchPage};

/// Longest value shown on a row's detail line
const META_VALUE_MAX: usize = 40;

/// Most columns shown on a row's detail line
const META_COLUMNS_MAX: usize = 4;

pub fn format_rows(rows: &[Row], schema: &DatasetSchema) -> String {
    let mut output = String::new();

    for row in rows {
        let id = row.get(schema.primary_key).map(display_value).unwrap_or_default();
        output.push_str(&format!("#{:<8} {}", id, truncate(&title_of(row, schema), 70)));
        if let Some(tag) = strategy_of(row) {
            output.push_str(&format!("  [{}]", tag));
        }
        output.push('\n');

        let meta = meta_line(row, schema);
        if !meta.is_empty() {
            output.push_str(&format!("          {}\n", meta));
        }
    }

    output
}

pub fn format_record(row: &Row) -> String {
    let width = row.keys().map(|k| k.len()).max().unwrap_or(0);
    let mut output = String::new();
    for (key, value) in row {
        output.push_str(&format!("{:<width$}  {}\n", key, display_value(value), width = width));
    }
    output
}

pub fn format_page(page: &SearchPage, schema: &DatasetSchema) -> String {
    let mut output = format_rows(&page.data, schema);
    if page.data.is_empty() {
        output.push_str("No results\n");
    }
    output.push_str(&format!(
        "\nPage {} of {} ({} total)\n",
        page.page, page.total_pages, page.total_count
    ));
    output
}

pub fn format_query(response: &QueryResponse, schema: &DatasetSchema) -> String {
    let mut output = String::new();

    let parsed = response
        .parsed
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(", ");
    output.push_str(&format!("Parsed:     {} ({})\n", parsed, response.extraction_source));
    if let Some(reason) = &response.fallback_reason {
        output.push_str(&format!("Fallback:   {}\n", reason));
    }

    let strategies = response
        .strategies
        .iter()
        .map(|s| {
            let mut label = format!("{} {}", s.strategy, s.rows);
            if let Some(level) = s.entity_match {
                label.push_str(&format!(" {}", level));
            }
            if let Some(name) = &s.resolved {
                label.push_str(&format!(" -> {}", name));
            }
            label
        })
        .collect::<Vec<_>>()
        .join(", ");
    output.push_str(&format!("Strategies: {}\n", strategies));
    if response.fallback_applied {
        output.push_str("Relaxed:    staged fallback applied\n");
    }
    output.push('\n');

    output.push_str(&format_rows(&response.results, schema));
    output.push_str(&format!("\n{} {}\n", response.results.len(), response.results_key));
    output
}

pub fn format_agent(response: &AgentResponse) -> String {
    let mut output = format!("{}\n", response.response);

    if !response.intermediate_steps.is_empty() {
        output.push_str("\nSteps:\n");
        for step in &response.intermediate_steps {
            let tool = step
                .tool
                .map(|t| t.to_string())
                .unwrap_or_else(|| "(unreadable)".to_string());
            match &step.error {
                Some(e) => output.push_str(&format!(
                    "  {:>2}. {:<22} error: {}\n",
                    step.index + 1,
                    tool,
                    truncate(e, 80)
                )),
                None => output.push_str(&format!("  {:>2}. {:<22} ok\n", step.index + 1, tool)),
            }
        }
    }

    match response.stop_reason {
        StopReason::Finished => {}
        StopReason::MaxIterations => output.push_str("\nStopped at the step limit\n"),
        StopReason::Error => output.push_str("\nStopped on error\n"),
    }
    output
}

/// Short columns other than the key, title and body
fn meta_line(row: &Row, schema: &DatasetSchema) -> String {
    row.iter()
        .filter(|(k, _)| {
            let k = k.as_str();
            k != schema.primary_key
                && k != STRATEGY_FIELD
                && k != schema.analysis.text_column
                && !super::TITLE_COLUMNS.contains(&k)
        })
        .map(|(k, v)| (k, display_value(v)))
        .filter(|(_, v)| !v.is_empty() && v.chars().count() <= META_VALUE_MAX)
        .take(META_COLUMNS_MAX)
        .map(|(k, v)| format!("{}: {}", k, v))
        .collect::<Vec<_>>()
        .join("  ")
}
