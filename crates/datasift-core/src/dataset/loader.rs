//! Dataset loaders
//!
//! A loader produces a SQLite file holding the dataset table and reports it
//! as a [`DatasetSnapshot`]. Readers never see a half-built file: the CSV
//! loader writes to a sibling `*.building` file and renames it into place.

use super::{ColumnType, DatasetKind, DatasetSchema, DatasetSnapshot};
use crate::db::{quote_ident, SqlParam, SqliteStorage};
use crate::error::{DataSiftError, Result};
use chrono::Utc;
use csv::ReaderBuilder;
use rusqlite::Connection;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Source of a dataset snapshot
pub trait DatasetLoader: Send + Sync {
    fn load(&self) -> Result<DatasetSnapshot>;

    /// Short description for logs
    fn describe(&self) -> String;
}

/// Header names that map onto a differently named column
const HEADER_ALIASES: &[(&str, &str)] = &[("cast", "actors")];

/// Builds the dataset table from a CSV file
pub struct CsvLoader {
    csv_path: PathBuf,
    db_path: PathBuf,
    kind: DatasetKind,
}

impl CsvLoader {
    pub fn new(csv_path: impl Into<PathBuf>, db_path: impl Into<PathBuf>, kind: DatasetKind) -> Self {
        Self {
            csv_path: csv_path.into(),
            db_path: db_path.into(),
            kind,
        }
    }

    fn building_path(&self) -> PathBuf {
        let mut name = self
            .db_path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "dataset.sqlite".into());
        name.push(".building");
        self.db_path.with_file_name(name)
    }

    /// Write every CSV record into a fresh database at `path`
    fn build(&self, path: &Path, content: &[u8]) -> Result<usize> {
        let schema = self.kind.schema();

        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(content);

        let headers = reader.headers()?.clone();
        let mapping = map_headers(schema, headers.iter());
        if mapping.iter().all(Option::is_none) {
            return Err(DataSiftError::Parse(format!(
                "CSV headers match no column of the {} dataset",
                self.kind
            )));
        }

        let mut conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode = DELETE; PRAGMA synchronous = OFF;")?;
        conn.execute_batch(&schema.create_table_sql())?;

        let placeholders = vec!["?"; schema.columns.len()].join(", ");
        let insert_sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(schema.table),
            schema
                .columns
                .iter()
                .map(|c| quote_ident(c.name))
                .collect::<Vec<_>>()
                .join(", "),
            placeholders
        );

        let tx = conn.transaction()?;
        let mut inserted = 0usize;
        {
            let mut stmt = tx.prepare(&insert_sql)?;
            for (row_num, result) in reader.records().enumerate() {
                let record = result.map_err(|e| {
                    DataSiftError::Parse(format!("Failed to parse CSV row {}: {}", row_num + 1, e))
                })?;

                let mut values: Vec<Option<SqlParam>> = vec![None; schema.columns.len()];
                for (idx, field) in record.iter().enumerate() {
                    if let Some(Some(col_idx)) = mapping.get(idx) {
                        values[*col_idx] = convert(field, schema.columns[*col_idx].ty);
                    }
                }

                stmt.execute(rusqlite::params_from_iter(values.iter()))?;
                inserted += 1;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }
}

impl DatasetLoader for CsvLoader {
    fn load(&self) -> Result<DatasetSnapshot> {
        let content = std::fs::read(&self.csv_path).map_err(|e| {
            DataSiftError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to read CSV file {:?}: {}", self.csv_path, e),
            ))
        })?;
        let fingerprint = fingerprint(&content);

        if let Some(parent) = self.db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let building = self.building_path();
        if building.exists() {
            std::fs::remove_file(&building)?;
        }

        let rows = match self.build(&building, &content) {
            Ok(rows) => rows,
            Err(e) => {
                let _ = std::fs::remove_file(&building);
                return Err(e);
            }
        };
        std::fs::rename(&building, &self.db_path)?;

        tracing::info!(
            "Loaded {} {} rows from {} into {}",
            rows,
            self.kind,
            self.csv_path.display(),
            self.db_path.display()
        );

        Ok(DatasetSnapshot {
            kind: self.kind,
            database_path: self.db_path.clone(),
            row_count: rows,
            fingerprint: Some(fingerprint),
            loaded_at: Utc::now(),
        })
    }

    fn describe(&self) -> String {
        format!("csv:{}", self.csv_path.display())
    }
}

/// Opens an existing database without rebuilding it
pub struct SqliteLoader {
    db_path: PathBuf,
    kind: DatasetKind,
}

impl SqliteLoader {
    pub fn new(db_path: impl Into<PathBuf>, kind: DatasetKind) -> Self {
        Self {
            db_path: db_path.into(),
            kind,
        }
    }
}

impl DatasetLoader for SqliteLoader {
    fn load(&self) -> Result<DatasetSnapshot> {
        let storage = SqliteStorage::new(&self.db_path, self.kind.schema());
        storage.verify()?;
        let row_count = storage.row_count()?;
        Ok(DatasetSnapshot {
            kind: self.kind,
            database_path: self.db_path.clone(),
            row_count,
            fingerprint: None,
            loaded_at: Utc::now(),
        })
    }

    fn describe(&self) -> String {
        format!("sqlite:{}", self.db_path.display())
    }
}

/// SHA-256 of the source bytes, hex encoded
pub fn fingerprint(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("{:x}", hasher.finalize())
}

/// Column index for each CSV header, matched case-insensitively
fn map_headers<'a>(
    schema: &DatasetSchema,
    headers: impl Iterator<Item = &'a str>,
) -> Vec<Option<usize>> {
    headers
        .map(|header| {
            let header = header.trim();
            let name = HEADER_ALIASES
                .iter()
                .find(|(alias, _)| alias.eq_ignore_ascii_case(header))
                .map(|(_, column)| *column)
                .unwrap_or(header);
            schema
                .columns
                .iter()
                .position(|c| c.name.eq_ignore_ascii_case(name))
        })
        .collect()
}

fn convert(field: &str, ty: ColumnType) -> Option<SqlParam> {
    let field = field.trim();
    if field.is_empty() {
        return None;
    }
    match ty {
        ColumnType::Text => Some(SqlParam::Text(field.to_string())),
        ColumnType::Integer => field
            .parse::<i64>()
            .ok()
            .or_else(|| {
                field
                    .parse::<f64>()
                    .ok()
                    .filter(|f| f.fract() == 0.0)
                    .map(|f| f as i64)
            })
            .map(SqlParam::Integer),
        ColumnType::Real => field.parse::<f64>().ok().map(SqlParam::Real),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Storage;
    use tempfile::TempDir;

    const NEWS_CSV: &str = "category,title,text\n\
        tech,Phones,New smartphones announced\n\
        sport,Cup final,\"The final, at last\"\n";

    #[test]
    fn test_csv_loader_assigns_ids() {
        let temp = TempDir::new().unwrap();
        let csv = temp.path().join("bbc-news.csv");
        std::fs::write(&csv, NEWS_CSV).unwrap();
        let db = temp.path().join("data").join("news.sqlite");

        let snapshot = CsvLoader::new(&csv, &db, DatasetKind::News).load().unwrap();
        assert_eq!(snapshot.row_count, 2);
        assert_eq!(snapshot.fingerprint.as_deref(), Some(fingerprint(NEWS_CSV.as_bytes()).as_str()));
        assert!(db.exists());
        assert!(!temp.path().join("data").join("news.sqlite.building").exists());

        let storage = SqliteStorage::new(&db, DatasetKind::News.schema());
        let rows = storage
            .run_sql("SELECT id, text FROM news ORDER BY id", &[])
            .unwrap();
        assert_eq!(rows[0]["id"], serde_json::json!(1));
        assert_eq!(rows[1]["text"], serde_json::json!("The final, at last"));
    }

    #[test]
    fn test_csv_loader_maps_cast_header() {
        let temp = TempDir::new().unwrap();
        let csv = temp.path().join("movies.csv");
        std::fs::write(
            &csv,
            "id,Title,cast,director,vote_average,budget\n\
             19995,Avatar,\"Sam Worthington, Zoe Saldana\",James Cameron,7.2,237000000\n",
        )
        .unwrap();
        let db = temp.path().join("movies.sqlite");

        CsvLoader::new(&csv, &db, DatasetKind::Movies).load().unwrap();
        let storage = SqliteStorage::new(&db, DatasetKind::Movies.schema());
        let rows = storage.run_sql("SELECT * FROM movies", &[]).unwrap();
        assert_eq!(rows[0]["actors"], serde_json::json!("Sam Worthington, Zoe Saldana"));
        assert_eq!(rows[0]["title"], serde_json::json!("Avatar"));
        assert_eq!(rows[0]["vote_average"], serde_json::json!(7.2));
        assert_eq!(rows[0]["overview"], serde_json::Value::Null);
    }

    #[test]
    fn test_failed_load_keeps_previous_file() {
        let temp = TempDir::new().unwrap();
        let csv = temp.path().join("news.csv");
        std::fs::write(&csv, NEWS_CSV).unwrap();
        let db = temp.path().join("news.sqlite");
        CsvLoader::new(&csv, &db, DatasetKind::News).load().unwrap();

        std::fs::write(&csv, "foo,bar\n1,2\n").unwrap();
        assert!(CsvLoader::new(&csv, &db, DatasetKind::News).load().is_err());

        let snapshot = SqliteLoader::new(&db, DatasetKind::News).load().unwrap();
        assert_eq!(snapshot.row_count, 2);
    }

    #[test]
    fn test_sqlite_loader_missing_file() {
        let temp = TempDir::new().unwrap();
        let err = SqliteLoader::new(temp.path().join("absent.sqlite"), DatasetKind::News)
            .load()
            .unwrap_err();
        assert!(matches!(err, DataSiftError::StorageUnavailable(_)));
    }
}
