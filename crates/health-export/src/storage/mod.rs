//! Storage layer for imported health records
//!
//! A single SQLite file holds every canonical record keyed by its content
//! hash, so importing the same export twice adds nothing.
//!
//! ## Storage Layout
//!
//! ```text
//! ~/.local/share/health-export/
//! └── health.db                    # SQLite: meta, health_record, record_metadata
//! ```
//!
//! ## Concurrent Access
//!
//! The database runs in WAL mode. An import writes inside one transaction,
//! so readers on other connections see either the state before the import or
//! the state after it. External tools can query the file directly:
//!
//! ```sql
//! SELECT metric_id, COUNT(*) FROM health_record GROUP BY metric_id;
//! ```

mod record_db;
mod schema;

pub use record_db::{ImportTransaction, MetricCount, RecordStore};
pub use schema::SCHEMA_VERSION;

use std::path::PathBuf;

use crate::config;
use crate::error::Result;

/// File name of the database inside the data directory
pub const DB_FILE_NAME: &str = "health.db";

/// Get the default database path
pub fn default_db_path() -> Result<PathBuf> {
    Ok(config::data_dir()?.join(DB_FILE_NAME))
}

/// Open the database at `path`, creating its parent directory if needed
pub fn open_or_create(path: impl Into<PathBuf>) -> Result<RecordStore> {
    let path = path.into();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        config::ensure_dir(parent)?;
    }
    RecordStore::open(&path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_or_create_makes_parent() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("dir").join(DB_FILE_NAME);
        let store = open_or_create(&path).unwrap();
        assert!(path.exists());
        assert_eq!(store.count_records(None).unwrap(), 0);
    }

    #[test]
    fn test_default_db_path() {
        let path = default_db_path().unwrap();
        assert!(path.ends_with("health-export/health.db"));
    }
}
