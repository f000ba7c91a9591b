//! Facts about an agent run derived from its trace

use super::tools::AgentTool;
use super::AgentStep;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeSet;

lazy_static! {
    static ref TABLE_RE: Regex = Regex::new(r"(?i)\b(?:FROM|JOIN)\s+([A-Za-z_][A-Za-z0-9_]*)").unwrap();
    static ref CTE_RE: Regex = Regex::new(r"(?i)\b([A-Za-z_][A-Za-z0-9_]*)\s+AS\s*\(").unwrap();
    static ref SUBQUERY_RE: Regex = Regex::new(r"(?i)\(\s*SELECT\b").unwrap();
    static ref AGGREGATE_RE: Regex = Regex::new(r"(?i)\b(?:COUNT|SUM|AVG|MAX|MIN)\s*\(").unwrap();
    static ref WINDOW_RE: Regex = Regex::new(r"(?i)\bOVER\s*\(|\bPARTITION\s+BY\b").unwrap();
}

/// Characters of the answer used as summary when it has a single line
const SUMMARY_CHARS: usize = 100;

/// SQL constructs seen in any executed query
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SqlFeatures {
    pub group_by: bool,
    pub having: bool,
    pub joins: bool,
    pub subqueries: bool,
    pub case_when: bool,
    pub window_functions: bool,
    pub with_clause: bool,
    pub aggregations: bool,
}

impl SqlFeatures {
    /// Classify one statement
    pub fn detect(sql: &str) -> Self {
        let upper = sql.to_uppercase();
        Self {
            group_by: upper.contains("GROUP BY"),
            having: upper.contains("HAVING"),
            joins: upper.contains("JOIN"),
            subqueries: SUBQUERY_RE.is_match(sql),
            case_when: upper.contains("CASE") && upper.contains("WHEN"),
            window_functions: WINDOW_RE.is_match(sql),
            with_clause: upper.trim_start().starts_with("WITH"),
            aggregations: AGGREGATE_RE.is_match(sql),
        }
    }

    /// Names of the constructs present
    pub fn names(&self) -> Vec<&'static str> {
        [
            (self.group_by, "group_by"),
            (self.having, "having"),
            (self.joins, "joins"),
            (self.subqueries, "subqueries"),
            (self.case_when, "case_when"),
            (self.window_functions, "window_functions"),
            (self.with_clause, "with_clause"),
            (self.aggregations, "aggregations"),
        ]
        .into_iter()
        .filter_map(|(present, name)| present.then_some(name))
        .collect()
    }

    fn merge(&mut self, other: &SqlFeatures) {
        self.group_by |= other.group_by;
        self.having |= other.having;
        self.joins |= other.joins;
        self.subqueries |= other.subqueries;
        self.case_when |= other.case_when;
        self.window_functions |= other.window_functions;
        self.with_clause |= other.with_clause;
        self.aggregations |= other.aggregations;
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Insights {
    pub summary: String,
    pub query_complexity: usize,
    pub multi_step_reasoning: bool,
    pub has_sql_query: bool,
    pub has_data_analysis: bool,
    pub has_follow_up: bool,
    pub advanced_sql_features: SqlFeatures,
    pub tables_used: Vec<String>,
}

pub fn extract_insights(answer: &str, steps: &[AgentStep]) -> Insights {
    let used = |tool: AgentTool| steps.iter().any(|s| s.tool == Some(tool));

    let mut features = SqlFeatures::default();
    let mut tables = BTreeSet::new();
    for sql in steps.iter().filter_map(executed_sql) {
        features.merge(&SqlFeatures::detect(sql));
        tables.extend(tables_in(sql));
    }

    Insights {
        summary: summary_of(answer),
        query_complexity: steps.len(),
        multi_step_reasoning: steps.len() > 1,
        has_sql_query: used(AgentTool::ExecuteSql),
        has_data_analysis: used(AgentTool::AnalyzeData),
        has_follow_up: used(AgentTool::FollowUpQuery),
        advanced_sql_features: features,
        tables_used: tables.into_iter().collect(),
    }
}

fn executed_sql(step: &AgentStep) -> Option<&str> {
    if step.tool != Some(AgentTool::ExecuteSql) {
        return None;
    }
    step.input
        .as_str()
        .or_else(|| step.input.get("query").and_then(|v| v.as_str()))
        .or_else(|| step.input.get("sql").and_then(|v| v.as_str()))
}

/// Table names after FROM/JOIN, excluding CTE names defined in the statement
fn tables_in(sql: &str) -> Vec<String> {
    let ctes: BTreeSet<String> = CTE_RE
        .captures_iter(sql)
        .map(|c| c[1].to_lowercase())
        .collect();
    TABLE_RE
        .captures_iter(sql)
        .map(|c| c[1].to_string())
        .filter(|t| !ctes.contains(&t.to_lowercase()))
        .collect()
}

fn summary_of(answer: &str) -> String {
    let answer = answer.trim();
    match answer.lines().next() {
        Some(first) if answer.contains('\n') => first.to_string(),
        _ => answer.chars().take(SUMMARY_CHARS).collect(),
    }
}
