//! Agent tool definitions and handlers

use super::catalog::{advanced_examples, sample_queries};
use crate::dataset::{ColumnType, DatasetSchema};
use crate::db::{is_read_only_statement, quote_ident, Row, SqlParam, Storage};
use crate::error::{DataSiftError, Result};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Row count above which `execute_sql` returns a sample instead of all rows
pub const SAMPLE_THRESHOLD: usize = 100;

/// Rows kept in a sampled `execute_sql` result
pub const SAMPLE_SIZE: usize = 10;

/// Limit appended to agent SQL that has none
const DEFAULT_SQL_LIMIT: usize = 10;

/// Rows fetched per key by `follow_up_query`
const FOLLOW_UP_LIMIT: usize = 20;

lazy_static! {
    static ref TRAILING_LIMIT_RE: Regex =
        Regex::new(r"(?i)\bLIMIT\s+\d+(?:\s*(?:,|OFFSET)\s*\d+)?\s*$").unwrap();
}

/// Fixed set of operations the agent may invoke
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentTool {
    ExecuteSql,
    FollowUpQuery,
    AnalyzeData,
    GetSchema,
    RunSampleQueries,
    GetAdvancedExamples,
}

impl AgentTool {
    pub const ALL: [AgentTool; 6] = [
        AgentTool::ExecuteSql,
        AgentTool::FollowUpQuery,
        AgentTool::AnalyzeData,
        AgentTool::GetSchema,
        AgentTool::RunSampleQueries,
        AgentTool::GetAdvancedExamples,
    ];

    pub fn name(self) -> &'static str {
        match self {
            AgentTool::ExecuteSql => "execute_sql",
            AgentTool::FollowUpQuery => "follow_up_query",
            AgentTool::AnalyzeData => "analyze_data",
            AgentTool::GetSchema => "get_schema",
            AgentTool::RunSampleQueries => "run_sample_queries",
            AgentTool::GetAdvancedExamples => "get_advanced_examples",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            AgentTool::ExecuteSql => {
                "Run one read-only SQL SELECT (or WITH) statement. LIMIT 10 is added when the \
                 query has no LIMIT. More than 100 rows come back as a count plus a 10 row sample."
            }
            AgentTool::FollowUpQuery => {
                "Follow up on earlier results. The instruction names an action \
                 (extract_details or analyze_distribution) and the keys to look up."
            }
            AgentTool::AnalyzeData => {
                "Summarize query results: record count and fields, plus on request \
                 score_distribution, helpful_votes, text_length or numeric_summary."
            }
            AgentTool::GetSchema => "List tables, columns with types, row counts and sample rows.",
            AgentTool::RunSampleQueries => "Run a fixed set of queries that show what the data looks like.",
            AgentTool::GetAdvancedExamples => {
                "Show worked SQL examples using CTEs, CASE and GROUP BY/HAVING."
            }
        }
    }

    /// JSON schema of the tool's input
    pub fn input_schema(self) -> Value {
        match self {
            AgentTool::ExecuteSql => json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string", "description": "SQL SELECT statement" }
                },
                "required": ["query"]
            }),
            AgentTool::FollowUpQuery => json!({
                "type": "object",
                "properties": {
                    "initial_results": { "description": "Results of an earlier step" },
                    "follow_up_instruction": { "type": "string" }
                },
                "required": ["initial_results", "follow_up_instruction"]
            }),
            AgentTool::AnalyzeData => json!({
                "type": "object",
                "properties": {
                    "sql_query_results": { "description": "Rows returned by execute_sql" },
                    "analysis_instruction": { "type": "string" }
                },
                "required": ["sql_query_results"]
            }),
            _ => json!({ "type": "object", "properties": {} }),
        }
    }
}

impl fmt::Display for AgentTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AgentTool {
    type Err = DataSiftError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "execute_sql" => Ok(AgentTool::ExecuteSql),
            "follow_up_query" => Ok(AgentTool::FollowUpQuery),
            "analyze_data" => Ok(AgentTool::AnalyzeData),
            "get_schema" | "get_database_schema" => Ok(AgentTool::GetSchema),
            "run_sample_queries" => Ok(AgentTool::RunSampleQueries),
            "get_advanced_examples" | "get_advanced_query_examples" => {
                Ok(AgentTool::GetAdvancedExamples)
            }
            other => Err(DataSiftError::Parse(format!("Unknown tool: {}", other))),
        }
    }
}

/// Dispatches tool invocations against one storage
pub struct ToolRegistry {
    storage: Arc<dyn Storage>,
}

impl ToolRegistry {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    pub fn schema(&self) -> &'static DatasetSchema {
        self.storage.schema()
    }

    /// Run `tool` on `input`
    ///
    /// `StorageUnavailable` is passed through unchanged, other failures come
    /// back as `ToolExecution` or `InvalidInput`.
    pub fn execute(&self, tool: AgentTool, input: &Value) -> Result<Value> {
        tracing::debug!("Tool {} input: {}", tool, input);
        match tool {
            AgentTool::ExecuteSql => {
                let sql = sql_argument(input).ok_or_else(|| {
                    DataSiftError::InvalidInput("execute_sql needs a 'query' string".to_string())
                })?;
                self.execute_sql(&sql)
            }
            AgentTool::FollowUpQuery => Ok(self.follow_up_query(input)),
            AgentTool::AnalyzeData => Ok(self.analyze_data(input)),
            AgentTool::GetSchema => self.get_schema(),
            AgentTool::RunSampleQueries => self.run_sample_queries(),
            AgentTool::GetAdvancedExamples => Ok(self.get_advanced_examples()),
        }
    }

    pub fn execute_sql(&self, sql: &str) -> Result<Value> {
        if !is_read_only_statement(sql) {
            return Err(DataSiftError::InvalidInput(
                "Only a single SELECT or WITH statement is allowed".to_string(),
            ));
        }
        let sql = with_default_limit(sql);
        tracing::info!("Agent SQL: {}", sql);

        let rows = self.storage.run_sql(&sql, &[]).map_err(|e| match e {
            DataSiftError::StorageUnavailable(_) => e,
            other => DataSiftError::ToolExecution {
                tool: AgentTool::ExecuteSql.name().to_string(),
                message: other.to_string(),
            },
        })?;

        if rows.len() > SAMPLE_THRESHOLD {
            let count = rows.len();
            let sample: Vec<Row> = rows.into_iter().take(SAMPLE_SIZE).collect();
            return Ok(json!({
                "result_count": count,
                "result_sample": sample,
                "message": format!(
                    "Query returned {} rows, showing the first {} as a sample",
                    count, SAMPLE_SIZE
                ),
            }));
        }
        Ok(Value::Array(rows.into_iter().map(Value::Object).collect()))
    }

    /// Never fails: problems are reported inside the returned value
    pub fn follow_up_query(&self, input: &Value) -> Value {
        let Some(args) = object_argument(input) else {
            return json!({ "follow_up_error": "Input must be an object with initial_results and follow_up_instruction" });
        };

        let results = match args.get("initial_results") {
            Some(Value::String(s)) => match serde_json::from_str::<Value>(s) {
                Ok(v) => v,
                Err(_) => {
                    return json!({
                        "follow_up_error": "Could not parse initial_results, run a new SQL query instead"
                    })
                }
            },
            Some(v) => v.clone(),
            None => Value::Null,
        };
        let instruction = args
            .get("follow_up_instruction")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let lowered = instruction.to_lowercase();

        let schema = self.schema();
        let outcome = if lowered.contains("extract_details")
            || lowered.contains("extract_product_details")
        {
            self.lookup_keys(instruction, |key| self.details_for(schema, key))
                .map(|found| found.map(|m| json!({ "details": m })))
        } else if lowered.contains("analyze_distribution")
            || lowered.contains("analyze_rating_distribution")
        {
            self.lookup_keys(instruction, |key| self.distribution_for(schema, key))
                .map(|found| found.map(|m| json!({ "distributions": m })))
        } else {
            Ok(None)
        };

        match outcome {
            Ok(Some(value)) => value,
            Ok(None) => json!({
                "message": "No follow-up action matched, returning the original results",
                "original_results": results,
            }),
            Err(e) => json!({ "follow_up_error": e.to_string() }),
        }
    }

    /// Run `fetch` for every key found in `instruction`; `None` when no key matches
    fn lookup_keys<F>(&self, instruction: &str, fetch: F) -> Result<Option<Map<String, Value>>>
    where
        F: Fn(&str) -> Result<Vec<Row>>,
    {
        let pattern = Regex::new(self.schema().analysis.key_pattern)?;
        let mut found = Map::new();
        for key in pattern.find_iter(instruction).map(|m| m.as_str()) {
            if found.contains_key(key) {
                continue;
            }
            let rows = fetch(key)?;
            found.insert(
                key.to_string(),
                Value::Array(rows.into_iter().map(Value::Object).collect()),
            );
        }
        Ok(if found.is_empty() { None } else { Some(found) })
    }

    fn details_for(&self, schema: &DatasetSchema, key: &str) -> Result<Vec<Row>> {
        let sql = format!(
            "SELECT * FROM {} WHERE {} = ? LIMIT {}",
            quote_ident(schema.table),
            quote_ident(schema.analysis.key_column),
            FOLLOW_UP_LIMIT
        );
        self.storage.run_sql(&sql, &[key_param(schema, key)])
    }

    fn distribution_for(&self, schema: &DatasetSchema, key: &str) -> Result<Vec<Row>> {
        let column = quote_ident(schema.analysis.distribution_column);
        let sql = format!(
            "SELECT {col}, COUNT(*) AS count FROM {table} WHERE {key} = ? GROUP BY {col} ORDER BY {col}",
            col = column,
            table = quote_ident(schema.table),
            key = quote_ident(schema.analysis.key_column),
        );
        self.storage.run_sql(&sql, &[key_param(schema, key)])
    }

    /// Never fails: problems are reported inside the returned value
    pub fn analyze_data(&self, input: &Value) -> Value {
        let args = object_argument(input);
        let raw = match &args {
            Some(args) => args.get("sql_query_results").cloned().unwrap_or(Value::Null),
            None => input.clone(),
        };
        let instruction = args
            .as_ref()
            .and_then(|a| a.get("analysis_instruction"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_lowercase();

        let results = match raw {
            Value::String(s) => match serde_json::from_str::<Value>(&s) {
                Ok(v) => v,
                Err(_) => {
                    return json!({ "analysis_error": "Could not parse sql_query_results as JSON" })
                }
            },
            other => other,
        };

        let records: Vec<&Map<String, Value>> = match &results {
            Value::Array(items) => items.iter().filter_map(Value::as_object).collect(),
            Value::Object(obj) => match obj.get("result_sample") {
                Some(Value::Array(items)) => items.iter().filter_map(Value::as_object).collect(),
                _ => vec![obj],
            },
            _ => Vec::new(),
        };

        if records.is_empty() {
            return json!({ "status": "no_data" });
        }

        // Sampled execute_sql output still reports the full row count
        let total = results
            .get("result_count")
            .and_then(Value::as_u64)
            .filter(|_| results.get("result_sample").is_some());

        let schema = self.schema();
        let first = records[0];
        let mut analysis = Map::new();
        match total {
            Some(total) => {
                analysis.insert("record_count".to_string(), json!(total));
                analysis.insert("sampled_records".to_string(), json!(records.len()));
            }
            None => {
                analysis.insert("record_count".to_string(), json!(records.len()));
            }
        }
        analysis.insert(
            "fields".to_string(),
            json!(first.keys().cloned().collect::<Vec<_>>()),
        );

        for key in ["score_distribution", "rating_distribution"] {
            if instruction.contains(key) {
                let column = schema.analysis.distribution_column;
                if first.contains_key(column) {
                    analysis.insert(key.to_string(), json!(distribution(&records, column)));
                }
                break;
            }
        }

        if instruction.contains("helpful_votes")
            && first.contains_key("HelpfulnessNumerator")
            && first.contains_key("HelpfulnessDenominator")
        {
            let helpful: f64 = records.iter().map(|r| number(r, "HelpfulnessNumerator")).sum();
            let votes: f64 = records.iter().map(|r| number(r, "HelpfulnessDenominator")).sum();
            analysis.insert(
                "helpful_votes".to_string(),
                json!({
                    "total_helpful": helpful,
                    "total_votes": votes,
                    "helpfulness_ratio": if votes > 0.0 { helpful / votes } else { 0.0 },
                }),
            );
        }

        for key in ["text_length", "review_length"] {
            if instruction.contains(key) {
                let column = schema.analysis.text_column;
                if first.contains_key(column) {
                    let lengths: Vec<f64> = records
                        .iter()
                        .map(|r| {
                            r.get(column)
                                .and_then(Value::as_str)
                                .map_or(0, |s| s.chars().count()) as f64
                        })
                        .collect();
                    analysis.insert(key.to_string(), json!(summarize(&lengths)));
                }
                break;
            }
        }

        if instruction.contains("numeric_summary") {
            let mut summary = Map::new();
            for field in first.keys() {
                let values: Vec<f64> = records
                    .iter()
                    .filter_map(|r| r.get(field).and_then(Value::as_f64))
                    .collect();
                if !values.is_empty() && first.get(field).is_some_and(Value::is_number) {
                    summary.insert(field.clone(), json!(summarize(&values)));
                }
            }
            analysis.insert("numeric_summary".to_string(), Value::Object(summary));
        }

        json!({ "status": "ok", "analysis": analysis })
    }

    pub fn get_schema(&self) -> Result<Value> {
        let tables = self.storage.table_info()?;
        Ok(json!({ "tables": tables }))
    }

    pub fn run_sample_queries(&self) -> Result<Value> {
        let mut results = Vec::new();
        for sql in sample_queries(self.schema().kind) {
            match self.execute_sql(sql) {
                Ok(result) => results.push(json!({ "query": sql, "result": result })),
                Err(e @ DataSiftError::StorageUnavailable(_)) => return Err(e),
                Err(e) => results.push(json!({ "query": sql, "error": e.to_string() })),
            }
        }
        Ok(Value::Array(results))
    }

    pub fn get_advanced_examples(&self) -> Value {
        Value::Array(
            advanced_examples(self.schema().kind)
                .iter()
                .map(|e| json!({ "title": e.title, "sql": e.sql }))
                .collect(),
        )
    }
}

/// Append `LIMIT 10` to statements without a LIMIT
pub fn with_default_limit(sql: &str) -> String {
    let body = sql.trim().trim_end_matches(';').trim_end();
    if TRAILING_LIMIT_RE.is_match(body) {
        return body.to_string();
    }
    // A trailing line comment would swallow the clause
    let sep = if body.contains("--") { "\n" } else { " " };
    format!("{}{}LIMIT {}", body, sep, DEFAULT_SQL_LIMIT)
}

/// Tool input as an object, accepting a JSON-encoded string
fn object_argument(input: &Value) -> Option<Map<String, Value>> {
    match input {
        Value::Object(map) => Some(map.clone()),
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(Value::Object(map)) => Some(map),
            _ => None,
        },
        _ => None,
    }
}

fn sql_argument(input: &Value) -> Option<String> {
    match input {
        Value::String(s) => match object_argument(input) {
            Some(map) => sql_argument(&Value::Object(map)),
            None => Some(s.clone()),
        },
        Value::Object(map) => map
            .get("query")
            .or_else(|| map.get("sql"))
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    }
}

fn key_param(schema: &DatasetSchema, key: &str) -> SqlParam {
    let integer_key = schema
        .column(schema.analysis.key_column)
        .is_some_and(|c| c.ty == ColumnType::Integer);
    match key.parse::<i64>() {
        Ok(n) if integer_key => SqlParam::Integer(n),
        _ => SqlParam::Text(key.to_string()),
    }
}

fn number(record: &Map<String, Value>, field: &str) -> f64 {
    record.get(field).and_then(Value::as_f64).unwrap_or(0.0)
}

fn distribution(records: &[&Map<String, Value>], column: &str) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for record in records {
        let key = match record.get(column) {
            Some(Value::Null) | None => continue,
            Some(Value::String(s)) => s.clone(),
            Some(v) => v.to_string(),
        };
        *counts.entry(key).or_insert(0) += 1;
    }
    counts
}

fn summarize(values: &[f64]) -> Value {
    if values.is_empty() {
        return json!({ "min": 0, "max": 0, "avg": 0 });
    }
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let avg = values.iter().sum::<f64>() / values.len() as f64;
    json!({ "min": min, "max": max, "avg": avg })
}
