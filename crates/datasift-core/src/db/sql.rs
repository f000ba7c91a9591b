//! Bound parameters and statement checks

use rusqlite::types::{ToSql, ToSqlOutput, Value as SqliteValue};
use serde::Serialize;
use std::fmt;

/// Value bound to a `?` placeholder
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SqlParam {
    Integer(i64),
    Real(f64),
    Text(String),
}

impl ToSql for SqlParam {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            SqlParam::Integer(i) => ToSqlOutput::Owned(SqliteValue::Integer(*i)),
            SqlParam::Real(f) => ToSqlOutput::Owned(SqliteValue::Real(*f)),
            SqlParam::Text(s) => ToSqlOutput::from(s.as_str()),
        })
    }
}

impl fmt::Display for SqlParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlParam::Integer(i) => write!(f, "{}", i),
            SqlParam::Real(r) => write!(f, "{}", r),
            SqlParam::Text(s) => write!(f, "'{}'", s),
        }
    }
}

impl From<&str> for SqlParam {
    fn from(s: &str) -> Self {
        SqlParam::Text(s.to_string())
    }
}

impl From<String> for SqlParam {
    fn from(s: String) -> Self {
        SqlParam::Text(s)
    }
}

impl From<i64> for SqlParam {
    fn from(i: i64) -> Self {
        SqlParam::Integer(i)
    }
}

impl From<f64> for SqlParam {
    fn from(f: f64) -> Self {
        SqlParam::Real(f)
    }
}

/// True for a single `SELECT` or `WITH` statement.
///
/// A trailing semicolon is allowed, anything after it is not. String
/// literals are skipped so a `;` inside quotes does not count.
pub fn is_read_only_statement(sql: &str) -> bool {
    let trimmed = sql.trim();
    let upper = trimmed.to_uppercase();
    if !(upper.starts_with("SELECT") || upper.starts_with("WITH")) {
        return false;
    }

    let mut in_single = false;
    let mut in_double = false;
    for (idx, ch) in trimmed.char_indices() {
        match ch {
            '\'' if !in_double => in_single = !in_single,
            '"' if !in_single => in_double = !in_double,
            ';' if !in_single && !in_double => {
                return trimmed[idx + 1..].trim().is_empty();
            }
            _ => {}
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_only_statement() {
        assert!(is_read_only_statement("SELECT * FROM Reviews"));
        assert!(is_read_only_statement("  with t as (select 1) select * from t;"));
        assert!(is_read_only_statement("SELECT ';' FROM news"));
        assert!(!is_read_only_statement("DELETE FROM news"));
        assert!(!is_read_only_statement("SELECT 1; DROP TABLE news"));
        assert!(!is_read_only_statement(""));
    }
}
