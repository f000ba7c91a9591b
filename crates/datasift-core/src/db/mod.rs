//! Storage layer for datasift
//!
//! Read-only query execution against the SQLite file holding the active
//! dataset. Every call opens its own connection so a snapshot swap (the
//! loader renaming a new file over the old one) is picked up by the next
//! query without coordination.

mod sql;

pub use sql::{is_read_only_statement, SqlParam};

use crate::dataset::DatasetSchema;
use crate::error::{DataSiftError, Result};
use crate::search::QuerySpec;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};

/// One result row, keyed by column name
pub type Row = serde_json::Map<String, Value>;

/// Column description returned by [`Storage::table_info`]
#[derive(Debug, Clone, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
}

/// Table description returned by [`Storage::table_info`]
#[derive(Debug, Clone, Serialize)]
pub struct TableInfo {
    pub name: String,
    pub columns: Vec<ColumnInfo>,
    pub row_count: usize,
    pub sample_rows: Vec<Row>,
}

/// Read-only query primitive over the active dataset
pub trait Storage: Send + Sync {
    fn schema(&self) -> &'static DatasetSchema;

    /// Run a mapped query spec and return its page of rows
    fn execute(&self, spec: &QuerySpec) -> Result<Vec<Row>>;

    /// Count all rows matching a spec, ignoring limit and offset
    fn count(&self, spec: &QuerySpec) -> Result<usize>;

    /// Run a single arbitrary read-only statement
    fn run_sql(&self, sql: &str, params: &[SqlParam]) -> Result<Vec<Row>>;

    /// Tables, columns, row counts and sample rows
    fn table_info(&self) -> Result<Vec<TableInfo>>;

    /// Distinct non-null values of a schema column
    fn distinct_values(&self, column: &str) -> Result<Vec<String>>;
}

/// SQLite-backed storage
#[derive(Debug, Clone)]
pub struct SqliteStorage {
    path: PathBuf,
    schema: &'static DatasetSchema,
}

/// Sample values longer than this are cut in [`Storage::table_info`]
const SAMPLE_VALUE_CHARS: usize = 300;

impl SqliteStorage {
    pub fn new(path: impl Into<PathBuf>, schema: &'static DatasetSchema) -> Self {
        Self {
            path: path.into(),
            schema,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open a read-only connection, failing when the file is missing
    fn connect(&self) -> Result<Connection> {
        if !self.path.exists() {
            return Err(DataSiftError::StorageUnavailable(format!(
                "Database file not found: {}",
                self.path.display()
            )));
        }
        let conn = Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| {
            DataSiftError::StorageUnavailable(format!(
                "Failed to open {}: {}",
                self.path.display(),
                e
            ))
        })?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Ok(conn)
    }

    /// Number of rows in the dataset table
    pub fn row_count(&self) -> Result<usize> {
        let conn = self.connect()?;
        let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(self.schema.table));
        let count: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(count.max(0) as usize)
    }

    /// Check that the dataset table exists
    pub fn verify(&self) -> Result<()> {
        let conn = self.connect()?;
        let exists: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [self.schema.table],
            |row| row.get(0),
        )?;
        if exists == 0 {
            return Err(DataSiftError::StorageUnavailable(format!(
                "Table '{}' missing from {}",
                self.schema.table,
                self.path.display()
            )));
        }
        Ok(())
    }
}

impl Storage for SqliteStorage {
    fn schema(&self) -> &'static DatasetSchema {
        self.schema
    }

    fn execute(&self, spec: &QuerySpec) -> Result<Vec<Row>> {
        let conn = self.connect()?;
        let sql = spec.select_sql();
        tracing::debug!("Executing: {} {:?}", sql, spec.params());
        query_rows(&conn, &sql, &spec.select_params())
    }

    fn count(&self, spec: &QuerySpec) -> Result<usize> {
        let conn = self.connect()?;
        let sql = spec.count_sql();
        let params = spec.params();
        let count: i64 = conn.query_row(
            &sql,
            rusqlite::params_from_iter(params.iter()),
            |row| row.get(0),
        )?;
        Ok(count.max(0) as usize)
    }

    fn run_sql(&self, sql: &str, params: &[SqlParam]) -> Result<Vec<Row>> {
        let conn = self.connect()?;
        let stmt = conn.prepare(sql)?;
        if !stmt.readonly() {
            return Err(DataSiftError::InvalidInput(
                "Only read-only statements are allowed".to_string(),
            ));
        }
        drop(stmt);
        query_rows(&conn, sql, params)
    }

    fn table_info(&self) -> Result<Vec<TableInfo>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut tables = Vec::with_capacity(names.len());
        for name in names {
            let ident = quote_ident(&name);

            let mut pragma = conn.prepare(&format!("PRAGMA table_info({})", ident))?;
            let columns = pragma
                .query_map([], |row| {
                    Ok(ColumnInfo {
                        name: row.get(1)?,
                        ty: row.get(2)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let row_count: i64 =
                conn.query_row(&format!("SELECT COUNT(*) FROM {}", ident), [], |row| {
                    row.get(0)
                })?;

            let sample_rows = query_rows(&conn, &format!("SELECT * FROM {} LIMIT 2", ident), &[])?
                .into_iter()
                .map(truncate_row)
                .collect();

            tables.push(TableInfo {
                name,
                columns,
                row_count: row_count.max(0) as usize,
                sample_rows,
            });
        }
        Ok(tables)
    }

    fn distinct_values(&self, column: &str) -> Result<Vec<String>> {
        let col = self
            .schema
            .column(column)
            .ok_or_else(|| DataSiftError::query_mapping(column, "not a column of this dataset"))?;
        let conn = self.connect()?;
        let sql = format!(
            "SELECT DISTINCT {col} FROM {table} WHERE {col} IS NOT NULL AND {col} != ''",
            col = quote_ident(col.name),
            table = quote_ident(self.schema.table)
        );
        let mut stmt = conn.prepare(&sql)?;
        let values = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(values)
    }
}

/// Double-quote an identifier for SQLite
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn query_rows(conn: &Connection, sql: &str, params: &[SqlParam]) -> Result<Vec<Row>> {
    let mut stmt = conn.prepare(sql)?;
    let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

    let mut rows = stmt.query(rusqlite::params_from_iter(params.iter()))?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let mut map = Row::new();
        for (idx, name) in names.iter().enumerate() {
            map.insert(name.clone(), value_to_json(row.get_ref(idx)?));
        }
        out.push(map);
    }
    Ok(out)
}

fn value_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::String(format!("<{} bytes>", b.len())),
    }
}

fn truncate_row(row: Row) -> Row {
    row.into_iter()
        .map(|(k, v)| match v {
            Value::String(s) if s.chars().count() > SAMPLE_VALUE_CHARS => {
                let cut: String = s.chars().take(SAMPLE_VALUE_CHARS).collect();
                (k, Value::String(format!("{}...", cut)))
            }
            other => (k, other),
        })
        .collect()
}
