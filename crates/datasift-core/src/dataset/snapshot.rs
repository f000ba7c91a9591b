//! Immutable view of the loaded dataset and its atomic swap

use super::{DatasetKind, DatasetSchema};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

/// Result of a successful load
#[derive(Debug, Clone, Serialize)]
pub struct DatasetSnapshot {
    pub kind: DatasetKind,
    pub database_path: PathBuf,
    pub row_count: usize,
    /// SHA-256 of the source CSV, when the snapshot was built from one
    pub fingerprint: Option<String>,
    pub loaded_at: DateTime<Utc>,
}

impl DatasetSnapshot {
    pub fn schema(&self) -> &'static DatasetSchema {
        self.kind.schema()
    }
}

/// Holds the current snapshot. Readers clone the `Arc` and keep a
/// consistent view for the whole request.
#[derive(Debug)]
pub struct SnapshotStore {
    current: RwLock<Arc<DatasetSnapshot>>,
}

impl SnapshotStore {
    pub fn new(initial: DatasetSnapshot) -> Self {
        Self {
            current: RwLock::new(Arc::new(initial)),
        }
    }

    pub fn current(&self) -> Arc<DatasetSnapshot> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Replace the snapshot, returning the previous one
    pub fn swap(&self, next: DatasetSnapshot) -> Arc<DatasetSnapshot> {
        let next = Arc::new(next);
        let mut guard = match self.current.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        std::mem::replace(&mut *guard, next)
    }
}
