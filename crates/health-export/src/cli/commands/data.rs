//! Database inspection and reset commands for health

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::cli::{open_existing, print_json, OutputFormat};
use crate::error::Result;
use crate::import;
use crate::models::MetricId;

#[derive(Debug, Serialize)]
struct MetricRow {
    metric_id: MetricId,
    label: &'static str,
    category: &'static str,
    unit: &'static str,
    count: u64,
    first: String,
    last: String,
}

/// List stored metrics with their record counts
pub fn metrics(db_path: &Path, format: OutputFormat) -> Result<()> {
    let Some(store) = open_existing(db_path)? else {
        return Ok(());
    };

    let rows: Vec<MetricRow> = store
        .metric_counts()?
        .into_iter()
        .map(|c| MetricRow {
            metric_id: c.metric_id,
            label: c.metric_id.label(),
            category: c.metric_id.category(),
            unit: c.metric_id.canonical_unit(),
            count: c.count,
            first: c.first_start.format("%Y-%m-%d").to_string(),
            last: c.last_start.format("%Y-%m-%d").to_string(),
        })
        .collect();

    if format == OutputFormat::Json {
        return print_json(&rows);
    }

    if rows.is_empty() {
        println!("No records stored in {}", db_path.display());
        return Ok(());
    }

    println!(
        "{:<28} {:<28} {:<12} {:<10} {:>10} {:<12} {:<12}",
        "Metric", "Name", "Category", "Unit", "Records", "First", "Last"
    );
    println!("{}", "-".repeat(117));
    for row in &rows {
        println!(
            "{:<28} {:<28} {:<12} {:<10} {:>10} {:<12} {:<12}",
            row.metric_id.as_str(),
            row.label,
            row.category,
            row.unit,
            row.count,
            row.first,
            row.last
        );
    }
    println!("{}", "-".repeat(117));
    println!(
        "{:<28} {:<28} {:<12} {:<10} {:>10}",
        "Total",
        "",
        "",
        "",
        rows.iter().map(|r| r.count).sum::<u64>()
    );

    Ok(())
}

/// Delete all imported records, or the whole database file with `hard`
pub fn reset(db_path: &Path, hard: bool) -> Result<()> {
    if !db_path.exists() {
        println!("No database found at: {}", db_path.display());
        return Ok(());
    }

    if hard {
        // Works even when the schema is incompatible, since nothing is opened
        for path in database_files(db_path) {
            if path.exists() {
                std::fs::remove_file(&path)?;
            }
        }
        println!("Removed database {}", db_path.display());
        return Ok(());
    }

    let Some(mut store) = open_existing(db_path)? else {
        return Ok(());
    };
    let deleted = import::reset(&mut store)?;
    println!("Deleted {} records from {}", deleted, db_path.display());
    Ok(())
}

/// The database file plus its WAL side files
fn database_files(db_path: &Path) -> Vec<PathBuf> {
    let mut files = vec![db_path.to_path_buf()];
    for suffix in ["-wal", "-shm"] {
        let mut name = db_path.as_os_str().to_os_string();
        name.push(suffix);
        files.push(PathBuf::from(name));
    }
    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::RecordStore;
    use tempfile::TempDir;

    #[test]
    fn test_database_files() {
        let files = database_files(Path::new("/tmp/health.db"));
        assert_eq!(
            files,
            vec![
                PathBuf::from("/tmp/health.db"),
                PathBuf::from("/tmp/health.db-wal"),
                PathBuf::from("/tmp/health.db-shm"),
            ]
        );
    }

    #[test]
    fn test_hard_reset_removes_files() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("health.db");
        drop(RecordStore::open(&path).unwrap());
        assert!(path.exists());

        reset(&path, true).unwrap();
        assert!(!path.exists());
        assert!(!database_files(&path).iter().any(|p| p.exists()));
    }

    #[test]
    fn test_soft_reset_keeps_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("health.db");
        drop(RecordStore::open(&path).unwrap());

        reset(&path, false).unwrap();
        assert!(path.exists());
        let store = RecordStore::open(&path).unwrap();
        assert_eq!(store.count_records(None).unwrap(), 0);
    }
}
