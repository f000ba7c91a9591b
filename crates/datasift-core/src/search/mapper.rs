//! Structured filter to parameterized SQL
//!
//! Every present field becomes exactly one predicate. Values are always
//! bound, column names only come from the static dataset schema.

use crate::dataset::{CompositionPolicy, DatasetSchema, FieldKind, FieldSpec, ValueType};
use crate::db::SqlParam;
use crate::error::{DataSiftError, Result};
use crate::filter::{FilterValue, StructuredFilter};
use serde::{Serialize, Serializer};
use std::fmt;

/// Page size used when neither the caller nor the filter sets one
pub const DEFAULT_PAGE_SIZE: usize = 20;

/// 1-based page request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Page {
    pub page: usize,
    pub limit: usize,
}

/// Largest limit or offset SQLite can bind as a non-negative integer
const MAX_BOUND: usize = i64::MAX as usize;

impl Page {
    pub fn new(page: usize, limit: usize) -> Result<Self> {
        if page == 0 {
            return Err(DataSiftError::query_mapping("page", "pages start at 1"));
        }
        if limit == 0 {
            return Err(DataSiftError::query_mapping("limit", "must be at least 1"));
        }
        if limit > MAX_BOUND {
            return Err(DataSiftError::query_mapping("limit", "too large"));
        }
        match (page - 1).checked_mul(limit) {
            Some(offset) if offset <= MAX_BOUND => Ok(Self { page, limit }),
            _ => Err(DataSiftError::query_mapping("page", "too large for the page size")),
        }
    }

    pub fn first(limit: usize) -> Self {
        Self {
            page: 1,
            limit: limit.clamp(1, MAX_BOUND),
        }
    }

    pub fn offset(&self) -> usize {
        (self.page - 1).saturating_mul(self.limit)
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::first(DEFAULT_PAGE_SIZE)
    }
}

/// Number of pages needed for `total` rows, never less than one
pub fn total_pages(total: usize, limit: usize) -> usize {
    if limit == 0 {
        return 1;
    }
    total.div_ceil(limit).max(1)
}

/// One `WHERE` clause with its bound values
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Predicate {
    pub field: String,
    pub clause: String,
    pub params: Vec<SqlParam>,
}

/// A single parameterized `SELECT` against the dataset table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuerySpec {
    pub table: &'static str,
    pub predicates: Vec<Predicate>,
    pub order_by: &'static str,
    pub descending: bool,
    pub limit: usize,
    pub offset: usize,
}

impl QuerySpec {
    fn where_clause(&self) -> String {
        if self.predicates.is_empty() {
            String::new()
        } else {
            let clauses: Vec<&str> = self.predicates.iter().map(|p| p.clause.as_str()).collect();
            format!(" WHERE {}", clauses.join(" AND "))
        }
    }

    pub fn select_sql(&self) -> String {
        format!(
            "SELECT * FROM {}{} ORDER BY {} {} LIMIT ? OFFSET ?",
            self.table,
            self.where_clause(),
            self.order_by,
            if self.descending { "DESC" } else { "ASC" }
        )
    }

    pub fn count_sql(&self) -> String {
        format!("SELECT COUNT(*) FROM {}{}", self.table, self.where_clause())
    }

    /// Predicate parameters in placeholder order
    pub fn params(&self) -> Vec<SqlParam> {
        self.predicates
            .iter()
            .flat_map(|p| p.params.iter().cloned())
            .collect()
    }

    /// Predicate parameters followed by limit and offset
    pub fn select_params(&self) -> Vec<SqlParam> {
        let mut params = self.params();
        params.push(SqlParam::Integer(i64::try_from(self.limit).unwrap_or(i64::MAX)));
        params.push(SqlParam::Integer(i64::try_from(self.offset).unwrap_or(i64::MAX)));
        params
    }

    /// Cache key: exact SQL text plus bound values
    pub fn signature(&self) -> String {
        format!(
            "{}|{}",
            self.select_sql(),
            serde_json::to_string(&self.select_params()).unwrap_or_default()
        )
    }

    pub fn count_signature(&self) -> String {
        format!(
            "{}|{}",
            self.count_sql(),
            serde_json::to_string(&self.params()).unwrap_or_default()
        )
    }
}

/// Provenance tag recorded on every result row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    /// Entity field match, tagged `<field>_match`
    EntityMatch(&'static str),
    KeywordSearch,
    FilterSearch,
    StagedFallback,
}

impl Strategy {
    pub fn tag(&self) -> String {
        match self {
            Strategy::EntityMatch(field) => format!("{}_match", field),
            Strategy::KeywordSearch => "keyword_search".to_string(),
            Strategy::FilterSearch => "filter_search".to_string(),
            Strategy::StagedFallback => "staged_fallback".to_string(),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.tag())
    }
}

impl Serialize for Strategy {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.tag())
    }
}

/// Entity predicate inside a spec that the aggregator may relax
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityTarget {
    pub field: &'static str,
    pub column: &'static str,
    pub multi_valued: bool,
    pub value: String,
    /// Index into `QuerySpec::predicates`
    pub predicate: usize,
}

/// How an entity predicate compares
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityMatch {
    /// Case-insensitive equality with the given name
    Exact(String),
    /// Case-insensitive containment of the requested name
    Substring,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedQuery {
    pub strategy: Strategy,
    pub spec: QuerySpec,
    pub entities: Vec<EntityTarget>,
}

/// Ordered queries for one filter
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryPlan {
    pub page: Page,
    pub queries: Vec<PlannedQuery>,
    /// Broader query run only when every primary query comes back empty
    pub fallback: Option<PlannedQuery>,
}

/// Maps filters for one dataset schema onto query specs
#[derive(Debug, Clone, Copy)]
pub struct FilterMapper {
    schema: &'static DatasetSchema,
}

impl FilterMapper {
    pub fn new(schema: &'static DatasetSchema) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &'static DatasetSchema {
        self.schema
    }

    /// Check every field against the schema
    pub fn validate(&self, filter: &StructuredFilter) -> Result<()> {
        for (name, value) in filter.iter() {
            let spec = self
                .schema
                .field(name)
                .ok_or_else(|| DataSiftError::query_mapping(name, "unknown field"))?;
            check_value(spec, value)?;
        }
        Ok(())
    }

    /// Page requested by the filter's `limit`, or `page` unchanged
    pub fn effective_page(&self, filter: &StructuredFilter, page: Page) -> Result<Page> {
        match filter.get("limit").and_then(FilterValue::as_i64) {
            Some(limit) if limit > 0 => {
                let limit = usize::try_from(limit)
                    .map_err(|_| DataSiftError::query_mapping("limit", "too large"))?;
                Page::new(page.page, limit)
            }
            _ => Ok(page),
        }
    }

    /// All predicates of the filter ANDed into one spec
    pub fn spec_for(&self, filter: &StructuredFilter, page: Page) -> Result<QuerySpec> {
        self.validate(filter)?;
        let page = self.effective_page(filter, page)?;
        let (predicates, _) = self.predicates(filter, |_| true);
        Ok(self.spec(predicates, page))
    }

    /// Ordered query plan under the given composition policy
    pub fn plan(
        &self,
        filter: &StructuredFilter,
        page: Page,
        policy: CompositionPolicy,
    ) -> Result<QueryPlan> {
        self.validate(filter)?;
        let page = self.effective_page(filter, page)?;
        let has_keyword = !filter.is_blank("keyword");

        let plan = match policy {
            CompositionPolicy::Conjunctive => {
                let (predicates, entities) = self.predicates(filter, |_| true);
                let strategy = if has_keyword {
                    Strategy::KeywordSearch
                } else {
                    Strategy::FilterSearch
                };
                let fallback = if has_keyword && predicates.len() > 1 {
                    let (rest, rest_entities) =
                        self.predicates(filter, |spec| !matches!(spec.kind, FieldKind::Keyword { .. }));
                    Some(PlannedQuery {
                        strategy: Strategy::StagedFallback,
                        spec: self.spec(rest, page),
                        entities: rest_entities,
                    })
                } else {
                    None
                };
                QueryPlan {
                    page,
                    queries: vec![PlannedQuery {
                        strategy,
                        spec: self.spec(predicates, page),
                        entities,
                    }],
                    fallback,
                }
            }
            CompositionPolicy::Union => {
                let mut queries = Vec::new();
                let is_plain = |spec: &FieldSpec| {
                    !matches!(spec.kind, FieldKind::Keyword { .. } | FieldKind::Entity { .. })
                };

                for field in self.schema.fields {
                    if !matches!(field.kind, FieldKind::Entity { .. }) || filter.is_blank(field.name) {
                        continue;
                    }
                    let (predicates, entities) = self.predicates(filter, |spec| {
                        spec.name == field.name || is_plain(spec)
                    });
                    queries.push(PlannedQuery {
                        strategy: Strategy::EntityMatch(field.name),
                        spec: self.spec(predicates, page),
                        entities,
                    });
                }

                if has_keyword {
                    let (predicates, _) = self.predicates(filter, |spec| {
                        matches!(spec.kind, FieldKind::Keyword { .. }) || is_plain(spec)
                    });
                    queries.push(PlannedQuery {
                        strategy: Strategy::KeywordSearch,
                        spec: self.spec(predicates, page),
                        entities: Vec::new(),
                    });
                }

                if queries.is_empty() {
                    let (predicates, _) = self.predicates(filter, is_plain);
                    queries.push(PlannedQuery {
                        strategy: Strategy::FilterSearch,
                        spec: self.spec(predicates, page),
                        entities: Vec::new(),
                    });
                }

                QueryPlan {
                    page,
                    queries,
                    fallback: None,
                }
            }
        };

        tracing::debug!(
            "Planned {} queries for {} (fallback: {})",
            plan.queries.len(),
            self.schema.kind,
            plan.fallback.is_some()
        );
        Ok(plan)
    }

    fn spec(&self, predicates: Vec<Predicate>, page: Page) -> QuerySpec {
        QuerySpec {
            table: self.schema.table,
            predicates,
            order_by: self.schema.primary_key,
            descending: true,
            limit: page.limit,
            offset: page.offset(),
        }
    }

    /// Predicates for the present fields accepted by `include`, in schema order
    fn predicates(
        &self,
        filter: &StructuredFilter,
        include: impl Fn(&FieldSpec) -> bool,
    ) -> (Vec<Predicate>, Vec<EntityTarget>) {
        let mut predicates = Vec::new();
        let mut entities = Vec::new();

        for field in self.schema.fields {
            if !include(field) || filter.is_blank(field.name) {
                continue;
            }
            let Some(value) = filter.get(field.name) else {
                continue;
            };

            if let FieldKind::Entity {
                column,
                multi_valued,
            } = field.kind
            {
                let target = EntityTarget {
                    field: field.name,
                    column,
                    multi_valued,
                    value: value.to_string(),
                    predicate: predicates.len(),
                };
                predicates.push(entity_predicate(&target, &EntityMatch::Exact(target.value.clone())));
                entities.push(target);
            } else if let Some(predicate) = field_predicate(field, value) {
                predicates.push(predicate);
            }
        }

        (predicates, entities)
    }
}

/// Rebuild `spec` with the entity predicate in the given match form
pub fn relax_entity(spec: &QuerySpec, target: &EntityTarget, how: &EntityMatch) -> QuerySpec {
    let mut relaxed = spec.clone();
    if let Some(slot) = relaxed.predicates.get_mut(target.predicate) {
        *slot = entity_predicate(target, how);
    }
    relaxed
}

fn entity_predicate(target: &EntityTarget, how: &EntityMatch) -> Predicate {
    let col = target.column;
    let (clause, params) = match how {
        EntityMatch::Exact(name) if target.multi_valued => (
            format!("(',' || LOWER(REPLACE({col}, ', ', ',')) || ',') LIKE ? ESCAPE '\\'"),
            vec![SqlParam::Text(format!(
                "%,{},%",
                escape_like(&name.trim().to_lowercase())
            ))],
        ),
        EntityMatch::Exact(name) => (
            format!("LOWER({col}) = LOWER(?)"),
            vec![SqlParam::Text(name.trim().to_string())],
        ),
        EntityMatch::Substring => (
            format!("LOWER({col}) LIKE LOWER(?) ESCAPE '\\'"),
            vec![SqlParam::Text(contains_pattern(&target.value))],
        ),
    };
    Predicate {
        field: target.field.to_string(),
        clause,
        params,
    }
}

fn field_predicate(field: &FieldSpec, value: &FilterValue) -> Option<Predicate> {
    let (clause, params) = match field.kind {
        FieldKind::Keyword { columns } | FieldKind::Substring { columns } => {
            let pattern = contains_pattern(&value.to_string());
            let parts: Vec<String> = columns
                .iter()
                .map(|c| format!("LOWER({c}) LIKE LOWER(?) ESCAPE '\\'"))
                .collect();
            let clause = if parts.len() == 1 {
                parts.join("")
            } else {
                format!("({})", parts.join(" OR "))
            };
            (clause, vec![SqlParam::Text(pattern); columns.len()])
        }
        FieldKind::Category { column, .. } => (
            format!("LOWER({column}) = LOWER(?)"),
            vec![SqlParam::Text(value.to_string())],
        ),
        FieldKind::AtLeast { column } => (format!("{column} >= ?"), vec![numeric_param(value)?]),
        FieldKind::AtMost { column } => (format!("{column} <= ?"), vec![numeric_param(value)?]),
        FieldKind::Year { column } => (
            format!("substr({column}, 1, 4) = ?"),
            vec![SqlParam::Text(value.to_string())],
        ),
        FieldKind::Sentiment { column } => match value.as_text()?.to_lowercase().as_str() {
            "positive" => (format!("{column} >= ?"), vec![SqlParam::Integer(4)]),
            "negative" => (format!("{column} <= ?"), vec![SqlParam::Integer(2)]),
            "neutral" => (format!("{column} = ?"), vec![SqlParam::Integer(3)]),
            _ => return None,
        },
        FieldKind::Entity { .. } | FieldKind::Limit => return None,
    };
    Some(Predicate {
        field: field.name.to_string(),
        clause,
        params,
    })
}

fn numeric_param(value: &FilterValue) -> Option<SqlParam> {
    match value {
        FilterValue::Integer(i) => Some(SqlParam::Integer(*i)),
        FilterValue::Number(n) => Some(SqlParam::Real(*n)),
        FilterValue::Text(_) => None,
    }
}

fn contains_pattern(value: &str) -> String {
    format!("%{}%", escape_like(value.trim()))
}

fn escape_like(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn check_value(spec: &FieldSpec, value: &FilterValue) -> Result<()> {
    let type_ok = match (spec.value_type, value) {
        (ValueType::Text, FilterValue::Text(_)) => true,
        (ValueType::Integer, FilterValue::Integer(_)) => true,
        (ValueType::Number, FilterValue::Integer(_) | FilterValue::Number(_)) => true,
        _ => false,
    };
    if !type_ok {
        return Err(DataSiftError::query_mapping(
            spec.name,
            format!(
                "expected {}, got {}",
                value_type_name(spec.value_type),
                value_type_name(value.value_type())
            ),
        ));
    }

    match (spec.kind, value) {
        (FieldKind::Category { allowed, .. }, FilterValue::Text(s)) => {
            if !allowed.iter().any(|a| a.eq_ignore_ascii_case(s)) {
                return Err(DataSiftError::query_mapping(
                    spec.name,
                    format!("must be one of: {}", allowed.join(", ")),
                ));
            }
        }
        (FieldKind::Sentiment { .. }, FilterValue::Text(s)) => {
            if !matches!(s.to_lowercase().as_str(), "positive" | "negative" | "neutral") {
                return Err(DataSiftError::query_mapping(
                    spec.name,
                    "must be one of: positive, negative, neutral",
                ));
            }
        }
        (FieldKind::Year { .. }, FilterValue::Integer(y)) => {
            if !(1000..=9999).contains(y) {
                return Err(DataSiftError::query_mapping(spec.name, "must be a four digit year"));
            }
        }
        (FieldKind::Limit, FilterValue::Integer(n)) => {
            if *n < 1 {
                return Err(DataSiftError::query_mapping(spec.name, "must be at least 1"));
            }
        }
        _ => {}
    }
    Ok(())
}

fn value_type_name(ty: ValueType) -> &'static str {
    match ty {
        ValueType::Text => "text",
        ValueType::Integer => "integer",
        ValueType::Number => "number",
    }
}
