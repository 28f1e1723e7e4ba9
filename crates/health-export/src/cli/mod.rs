pub mod commands;

use std::path::Path;

use chrono::NaiveDate;
use serde::Serialize;

use crate::error::{HealthError, Result};
use crate::storage::RecordStore;

/// Output format shared by every command
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

/// Parse a `YYYY-MM-DD` command line date
pub fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| HealthError::InvalidDateFormat(s.to_string()))
}

/// Pretty-print a value as JSON on stdout
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Open an existing database for reading, or tell the user how to create one.
///
/// The hint goes to stderr so JSON on stdout stays parseable.
pub(crate) fn open_existing(db_path: &Path) -> Result<Option<RecordStore>> {
    if !db_path.exists() {
        eprintln!("No database found at: {}", db_path.display());
        eprintln!("Run 'health import <PATH>' to create one.");
        return Ok(None);
    }
    RecordStore::open(db_path).map(Some)
}
