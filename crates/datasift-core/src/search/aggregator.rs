//! Executes a query plan and merges its results
//!
//! Queries run in plan order. Each row is tagged with the strategy that
//! produced it, then rows are deduplicated by primary key keeping the first
//! occurrence. Entity predicates are relaxed from exact to substring to
//! fuzzy, each step only when the previous one matched nothing.

use super::cache::QueryCache;
use super::mapper::{relax_entity, EntityMatch, EntityTarget, PlannedQuery, QueryPlan, QuerySpec, Strategy};
use crate::db::{Row, Storage};
use crate::error::Result;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;

/// Row field holding the provenance tag
pub const STRATEGY_FIELD: &str = "_strategy";

/// Minimum trigram similarity for a fuzzy entity match
pub const FUZZY_THRESHOLD: f64 = 0.45;

/// How an entity predicate ended up matching
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchLevel {
    Exact,
    Substring,
    Fuzzy,
    NoMatch,
}

impl fmt::Display for MatchLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MatchLevel::Exact => "exact",
            MatchLevel::Substring => "substring",
            MatchLevel::Fuzzy => "fuzzy",
            MatchLevel::NoMatch => "no match",
        })
    }
}

/// Outcome of one planned query
#[derive(Debug, Clone, Serialize)]
pub struct StrategyReport {
    pub strategy: Strategy,
    pub rows: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_match: Option<MatchLevel>,
    /// Name a fuzzy match resolved to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved: Option<String>,
}

/// Merged, deduplicated rows with provenance
#[derive(Debug, Clone, Serialize)]
pub struct Aggregated {
    pub rows: Vec<Row>,
    pub strategies: Vec<StrategyReport>,
    pub fallback_applied: bool,
}

pub struct ResultAggregator<'a> {
    storage: &'a dyn Storage,
    cache: &'a QueryCache,
}

impl<'a> ResultAggregator<'a> {
    pub fn new(storage: &'a dyn Storage, cache: &'a QueryCache) -> Self {
        Self { storage, cache }
    }

    /// Execute every planned query and merge the results
    pub fn run(&self, plan: &QueryPlan) -> Result<Aggregated> {
        let mut batches = Vec::with_capacity(plan.queries.len() + 1);
        let mut strategies = Vec::with_capacity(plan.queries.len() + 1);

        for planned in &plan.queries {
            let (rows, report) = self.execute_planned(planned)?;
            tracing::debug!("{}: {} rows", planned.strategy, rows.len());
            strategies.push(report);
            batches.push((planned.strategy, rows));
        }

        let mut fallback_applied = false;
        if batches.iter().all(|(_, rows)| rows.is_empty()) {
            if let Some(fallback) = &plan.fallback {
                let (rows, report) = self.execute_planned(fallback)?;
                tracing::info!(
                    "Primary queries matched nothing, staged fallback returned {} rows",
                    rows.len()
                );
                strategies.push(report);
                batches.push((fallback.strategy, rows));
                fallback_applied = true;
            }
        }

        let primary_key = self.storage.schema().primary_key;
        let mut rows = merge(batches, primary_key);
        rows.truncate(plan.page.limit);

        Ok(Aggregated {
            rows,
            strategies,
            fallback_applied,
        })
    }

    fn fetch(&self, spec: &QuerySpec) -> Result<Vec<Row>> {
        self.cache
            .get_or_compute(&spec.signature(), || self.storage.execute(spec))
    }

    fn execute_planned(&self, planned: &PlannedQuery) -> Result<(Vec<Row>, StrategyReport)> {
        let mut spec = planned.spec.clone();
        let mut rows = self.fetch(&spec)?;
        let mut report = StrategyReport {
            strategy: planned.strategy,
            rows: 0,
            entity_match: planned.entities.first().map(|_| MatchLevel::Exact),
            resolved: None,
        };

        for target in &planned.entities {
            if !rows.is_empty() {
                break;
            }

            spec = relax_entity(&spec, target, &EntityMatch::Substring);
            rows = self.fetch(&spec)?;
            if !rows.is_empty() {
                report.entity_match = Some(MatchLevel::Substring);
                break;
            }

            report.entity_match = Some(MatchLevel::NoMatch);
            if let Some(name) = self.fuzzy_candidate(target)? {
                spec = relax_entity(&spec, target, &EntityMatch::Exact(name.clone()));
                rows = self.fetch(&spec)?;
                if !rows.is_empty() {
                    tracing::info!("Fuzzy matched {} '{}' to '{}'", target.field, target.value, name);
                    report.entity_match = Some(MatchLevel::Fuzzy);
                    report.resolved = Some(name);
                    break;
                }
            }
        }

        report.rows = rows.len();
        Ok((rows, report))
    }

    /// Closest known value of the entity column, if similar enough
    fn fuzzy_candidate(&self, target: &EntityTarget) -> Result<Option<String>> {
        let values = self.storage.distinct_values(target.column)?;
        let wanted = target.value.to_lowercase();

        let mut seen = HashSet::new();
        let mut best: Option<(f64, String)> = None;
        let names = values.iter().flat_map(|v| {
            if target.multi_valued {
                v.split(',').map(str::trim).collect::<Vec<_>>()
            } else {
                vec![v.trim()]
            }
        });

        for name in names {
            if name.is_empty() || !seen.insert(name.to_lowercase()) {
                continue;
            }
            let score = trigram_similarity(&wanted, &name.to_lowercase());
            if score >= FUZZY_THRESHOLD && best.as_ref().map_or(true, |(b, _)| score > *b) {
                best = Some((score, name.to_string()));
            }
        }

        Ok(best.map(|(score, name)| {
            tracing::debug!("Best fuzzy candidate for '{}': '{}' ({:.2})", target.value, name, score);
            name
        }))
    }
}

/// Tag rows with their strategy and drop later duplicates
pub fn merge(batches: Vec<(Strategy, Vec<Row>)>, primary_key: &str) -> Vec<Row> {
    let mut seen = HashSet::new();
    let mut merged = Vec::new();

    for (strategy, rows) in batches {
        for mut row in rows {
            let key = match row.get(primary_key) {
                Some(Value::Null) | None => None,
                Some(v) => Some(v.to_string()),
            };
            if let Some(key) = key {
                if !seen.insert(key) {
                    continue;
                }
            }
            row.insert(STRATEGY_FIELD.to_string(), Value::String(strategy.tag()));
            merged.push(row);
        }
    }
    merged
}

/// Jaccard similarity of padded character trigrams
pub fn trigram_similarity(a: &str, b: &str) -> f64 {
    let ta = trigrams(a);
    let tb = trigrams(b);
    if ta.is_empty() && tb.is_empty() {
        return if a == b { 1.0 } else { 0.0 };
    }
    let shared = ta.intersection(&tb).count();
    let union = ta.len() + tb.len() - shared;
    if union == 0 {
        0.0
    } else {
        shared as f64 / union as f64
    }
}

fn trigrams(text: &str) -> HashSet<[char; 3]> {
    let mut out = HashSet::new();
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let chars: Vec<char> = [' ', ' ']
            .into_iter()
            .chain(word.chars().flat_map(char::to_lowercase))
            .chain([' '])
            .collect();
        for window in chars.windows(3) {
            out.insert([window[0], window[1], window[2]]);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(id: i64) -> Row {
        let mut row = Row::new();
        row.insert("id".to_string(), json!(id));
        row
    }

    #[test]
    fn test_merge_first_occurrence_wins() {
        let merged = merge(
            vec![
                (Strategy::EntityMatch("director"), vec![row(1), row(2)]),
                (Strategy::KeywordSearch, vec![row(2), row(3)]),
            ],
            "id",
        );
        let ids: Vec<i64> = merged.iter().map(|r| r["id"].as_i64().unwrap()).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(merged[1][STRATEGY_FIELD], json!("director_match"));
        assert_eq!(merged[2][STRATEGY_FIELD], json!("keyword_search"));
    }

    #[test]
    fn test_trigram_similarity() {
        assert_eq!(trigram_similarity("nolan", "nolan"), 1.0);
        assert!(trigram_similarity("cristopher nolan", "christopher nolan") >= FUZZY_THRESHOLD);
        assert!(trigram_similarity("chris nolan", "christopher nolan") >= FUZZY_THRESHOLD);
        assert!(trigram_similarity("steven spielberg", "christopher nolan") < FUZZY_THRESHOLD);
        assert_eq!(trigram_similarity("", "nolan"), 0.0);
    }
}
