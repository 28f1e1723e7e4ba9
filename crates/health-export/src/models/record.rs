//! Record types flowing through the import pipeline

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::metric::MetricId;

/// Which export element an entry came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Record,
    Workout,
    /// Daily ring totals; `start_date` holds `dateComponents`, the other
    /// attributes sit in `metadata`
    ActivitySummary,
}

/// One leaf element as found in the export, attributes still in text form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEntry {
    pub kind: EntryKind,
    /// `type` for records, `workoutActivityType` for workouts, the element
    /// name for activity summaries
    pub type_tag: String,
    /// `YYYY-MM-DD HH:MM:SS +HHMM`
    pub start_date: String,
    pub end_date: String,
    pub value: Option<String>,
    pub unit: Option<String>,
    pub source_name: String,
    pub metadata: BTreeMap<String, String>,
}

impl RawEntry {
    pub fn new(kind: EntryKind, type_tag: impl Into<String>) -> Self {
        Self {
            kind,
            type_tag: type_tag.into(),
            start_date: String::new(),
            end_date: String::new(),
            value: None,
            unit: None,
            source_name: String::new(),
            metadata: BTreeMap::new(),
        }
    }
}

/// A normalized sample, ready to store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    pub metric_id: MetricId,
    pub start_ts: DateTime<Utc>,
    pub end_ts: DateTime<Utc>,
    /// In `metric_id.canonical_unit()`
    pub value: f64,
    pub source_name: String,
    /// Dedup key, see `normalize::record_hash`
    pub record_hash: String,
    pub metadata: BTreeMap<String, String>,
}

impl CanonicalRecord {
    pub fn duration_secs(&self) -> f64 {
        (self.end_ts - self.start_ts).num_milliseconds() as f64 / 1000.0
    }
}

/// A persisted row from `health_record`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub id: i64,
    pub metric_id: MetricId,
    pub start_ts: DateTime<Utc>,
    pub end_ts: DateTime<Utc>,
    pub value: f64,
    pub source_name: String,
    pub record_hash: String,
    pub imported_at: DateTime<Utc>,
}

impl StoredRecord {
    pub fn duration_secs(&self) -> f64 {
        (self.end_ts - self.start_ts).num_milliseconds() as f64 / 1000.0
    }
}

/// Counters reported by an import
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportStats {
    /// Entries read from the export
    pub processed: u64,
    /// New rows written
    pub inserted: u64,
    /// Rows whose hash was already stored
    pub duplicates: u64,
    /// Entries of a supported metric that failed normalization
    pub rejected: u64,
    /// Entries of metrics outside the supported set
    pub skipped: u64,
    pub metadata_inserted: u64,
    /// Activity summary days inserted or changed
    pub summaries: u64,
}

impl ImportStats {
    /// Fold the storage counters of a written batch into these stats
    pub fn absorb(&mut self, batch: &ImportStats) {
        self.processed += batch.processed;
        self.inserted += batch.inserted;
        self.duplicates += batch.duplicates;
        self.rejected += batch.rejected;
        self.skipped += batch.skipped;
        self.metadata_inserted += batch.metadata_inserted;
        self.summaries += batch.summaries;
    }
}

impl fmt::Display for ImportStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Inserted: {}, Duplicates: {}, Rejected: {}",
            self.inserted, self.duplicates, self.rejected
        )?;
        if self.skipped > 0 {
            write!(f, ", Skipped: {}", self.skipped)?;
        }
        if self.summaries > 0 {
            write!(f, ", Activity days: {}", self.summaries)?;
        }
        Ok(())
    }
}
