//! SQLite-backed record store
//!
//! Holds canonical records keyed by their content hash:
//! - health_record: one row per sample, `record_hash` unique
//! - record_metadata: key/value pairs attached to a record hash
//! - activity_summary: daily ring totals keyed by day

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, Row, Transaction, TransactionBehavior};
use serde::Serialize;

use super::schema;
use crate::error::{HealthError, Result};
use crate::models::{ActivitySummary, CanonicalRecord, ImportStats, MetricId, StoredRecord};

/// How long a writer waits for another connection's lock before failing
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SELECT_RECORD: &str = "SELECT id, metric_id, start_ts, end_ts, value, source_name, record_hash, imported_at
     FROM health_record";

const SELECT_SUMMARY: &str = "SELECT day, active_energy_kcal, active_energy_goal_kcal, exercise_minutes,
            exercise_goal_minutes, stand_hours, stand_goal_hours
     FROM activity_summary";

const DAY_FORMAT: &str = "%Y-%m-%d";

/// Stored row count for one metric
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricCount {
    pub metric_id: MetricId,
    pub count: u64,
    pub first_start: DateTime<Utc>,
    pub last_start: DateTime<Utc>,
}

/// Handle to the health database
pub struct RecordStore {
    conn: Connection,
    path: Option<PathBuf>,
}

impl RecordStore {
    /// Open or create the database at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|e| {
            HealthError::storage(format!(
                "Failed to open database {}: {}",
                path.display(),
                e
            ))
        })?;

        conn.busy_timeout(BUSY_TIMEOUT)
            .map_err(|e| HealthError::storage(format!("Failed to set busy timeout: {}", e)))?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .map_err(|e| HealthError::storage(format!("Failed to enable WAL: {}", e)))?;

        schema::migrate(&conn)?;
        Ok(Self {
            conn,
            path: Some(path.to_path_buf()),
        })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| {
            HealthError::storage(format!("Failed to open in-memory database: {}", e))
        })?;

        schema::migrate(&conn)?;
        Ok(Self { conn, path: None })
    }

    /// Open a second connection to the same file, e.g. for a reader thread
    pub fn try_clone(&self) -> Result<Self> {
        match &self.path {
            Some(path) => Self::open(path),
            None => Err(HealthError::storage(
                "An in-memory database cannot be opened twice",
            )),
        }
    }

    /// File backing this store, `None` when in memory
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Write one batch in its own transaction.
    ///
    /// Records whose hash is already stored count as duplicates. Any failure
    /// rolls back the whole batch.
    pub fn import_batch(&mut self, records: &[CanonicalRecord]) -> Result<ImportStats> {
        let mut tx = self.begin_import()?;
        tx.write_batch(records)?;
        tx.commit()
    }

    /// Open a write transaction spanning many batches.
    ///
    /// Nothing becomes visible to other connections until
    /// [`ImportTransaction::commit`]; dropping the transaction rolls it back.
    pub fn begin_import(&mut self) -> Result<ImportTransaction<'_>> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| HealthError::storage(format!("Failed to begin import: {}", e)))?;

        Ok(ImportTransaction {
            tx,
            imported_at: Utc::now().timestamp(),
            stats: ImportStats::default(),
        })
    }

    /// Remove every record, its metadata and all activity summaries,
    /// returning the record count removed
    pub fn delete_all(&mut self) -> Result<u64> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| HealthError::storage(format!("Failed to begin reset: {}", e)))?;

        tx.execute("DELETE FROM record_metadata", [])
            .map_err(|e| HealthError::storage(format!("Failed to delete metadata: {}", e)))?;
        tx.execute("DELETE FROM activity_summary", [])
            .map_err(|e| HealthError::storage(format!("Failed to delete summaries: {}", e)))?;
        let deleted = tx
            .execute("DELETE FROM health_record", [])
            .map_err(|e| HealthError::storage(format!("Failed to delete records: {}", e)))?;
        tx.commit()
            .map_err(|e| HealthError::storage(format!("Failed to commit reset: {}", e)))?;

        Ok(deleted as u64)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Records of `metric` with `start <= start_ts < end`, oldest first
    pub fn query_range(
        &self,
        metric: MetricId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<StoredRecord>> {
        self.query_between(metric, ceil_secs(start), ceil_secs(end))
    }

    /// Every record of `metric`, oldest first
    pub fn query_all(&self, metric: MetricId) -> Result<Vec<StoredRecord>> {
        self.query_between(metric, i64::MIN, i64::MAX)
    }

    fn query_between(&self, metric: MetricId, start: i64, end: i64) -> Result<Vec<StoredRecord>> {
        let mut stmt = self
            .conn
            .prepare_cached(&format!(
                "{} WHERE metric_id = ? AND start_ts >= ? AND start_ts < ?
                 ORDER BY start_ts, id",
                SELECT_RECORD
            ))
            .map_err(|e| HealthError::storage(format!("Failed to prepare query: {}", e)))?;

        let records = stmt
            .query_map(params![metric.as_str(), start, end], record_from_row)
            .map_err(|e| HealthError::storage(format!("Failed to query records: {}", e)))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| HealthError::storage(format!("Failed to read record: {}", e)))?;

        Ok(records)
    }

    /// Metadata stored for a record hash
    pub fn metadata_for(&self, record_hash: &str) -> Result<BTreeMap<String, String>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT key, value FROM record_metadata WHERE record_hash = ?")
            .map_err(|e| HealthError::storage(format!("Failed to prepare query: {}", e)))?;

        let metadata = stmt
            .query_map(params![record_hash], |row| Ok((row.get(0)?, row.get(1)?)))
            .map_err(|e| HealthError::storage(format!("Failed to query metadata: {}", e)))?
            .collect::<rusqlite::Result<BTreeMap<String, String>>>()
            .map_err(|e| HealthError::storage(format!("Failed to read metadata: {}", e)))?;

        Ok(metadata)
    }

    /// Activity summaries for the inclusive days `from..=to`, oldest first
    pub fn activity_summaries(
        &self,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<ActivitySummary>> {
        let mut stmt = self
            .conn
            .prepare_cached(&format!(
                "{} WHERE (?1 IS NULL OR day >= ?1) AND (?2 IS NULL OR day <= ?2)
                 ORDER BY day",
                SELECT_SUMMARY
            ))
            .map_err(|e| HealthError::storage(format!("Failed to prepare query: {}", e)))?;

        let from = from.map(|d| d.format(DAY_FORMAT).to_string());
        let to = to.map(|d| d.format(DAY_FORMAT).to_string());
        let summaries = stmt
            .query_map(params![from, to], summary_from_row)
            .map_err(|e| HealthError::storage(format!("Failed to query summaries: {}", e)))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| HealthError::storage(format!("Failed to read summary: {}", e)))?;

        Ok(summaries)
    }

    /// Number of stored records, optionally for one metric
    pub fn count_records(&self, metric: Option<MetricId>) -> Result<u64> {
        let count: i64 = match metric {
            Some(metric) => self.conn.query_row(
                "SELECT COUNT(*) FROM health_record WHERE metric_id = ?",
                params![metric.as_str()],
                |row| row.get(0),
            ),
            None => self
                .conn
                .query_row("SELECT COUNT(*) FROM health_record", [], |row| row.get(0)),
        }
        .map_err(|e| HealthError::storage(format!("Failed to count records: {}", e)))?;

        Ok(count as u64)
    }

    /// Per-metric row counts and time span, ordered by metric id
    pub fn metric_counts(&self) -> Result<Vec<MetricCount>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT metric_id, COUNT(*), MIN(start_ts), MAX(start_ts)
                 FROM health_record
                 GROUP BY metric_id
                 ORDER BY metric_id",
            )
            .map_err(|e| HealthError::storage(format!("Failed to prepare query: {}", e)))?;

        let counts = stmt
            .query_map([], |row| {
                Ok(MetricCount {
                    metric_id: metric_from_row(row, 0)?,
                    count: row.get::<_, i64>(1)? as u64,
                    first_start: timestamp_from_row(row, 2)?,
                    last_start: timestamp_from_row(row, 3)?,
                })
            })
            .map_err(|e| HealthError::storage(format!("Failed to count metrics: {}", e)))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| HealthError::storage(format!("Failed to read metric counts: {}", e)))?;

        Ok(counts)
    }
}

/// An open write transaction on a [`RecordStore`]
pub struct ImportTransaction<'a> {
    tx: Transaction<'a>,
    imported_at: i64,
    stats: ImportStats,
}

impl ImportTransaction<'_> {
    /// Insert a batch, skipping records whose hash is already stored.
    ///
    /// Only a `record_hash` conflict counts as a duplicate; a record the table
    /// cannot hold, or any other constraint failure, is a `Storage` error.
    pub fn write_batch(&mut self, records: &[CanonicalRecord]) -> Result<ImportStats> {
        let mut batch = ImportStats::default();
        let mut insert_record = self
            .tx
            .prepare_cached(
                "INSERT INTO health_record
                     (metric_id, start_ts, end_ts, value, source_name, record_hash, imported_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(record_hash) DO NOTHING",
            )
            .map_err(|e| HealthError::storage(format!("Failed to prepare insert: {}", e)))?;
        let mut insert_metadata = self
            .tx
            .prepare_cached(
                "INSERT INTO record_metadata (record_hash, key, value) VALUES (?, ?, ?)
                 ON CONFLICT(record_hash, key) DO NOTHING",
            )
            .map_err(|e| HealthError::storage(format!("Failed to prepare insert: {}", e)))?;

        for record in records {
            check_record(record)?;
            let changed = insert_record
                .execute(params![
                    record.metric_id.as_str(),
                    record.start_ts.timestamp(),
                    record.end_ts.timestamp(),
                    record.value,
                    record.source_name,
                    record.record_hash,
                    self.imported_at,
                ])
                .map_err(|e| HealthError::storage(format!("Failed to insert record: {}", e)))?;

            if changed == 0 {
                batch.duplicates += 1;
                continue;
            }
            batch.inserted += 1;

            for (key, value) in &record.metadata {
                batch.metadata_inserted += insert_metadata
                    .execute(params![record.record_hash, key, value])
                    .map_err(|e| HealthError::storage(format!("Failed to insert metadata: {}", e)))?
                    as u64;
            }
        }

        self.stats.absorb(&batch);
        Ok(batch)
    }

    /// Insert or replace activity summaries by day.
    ///
    /// Returns the days inserted or changed; re-writing identical totals
    /// counts nothing.
    pub fn write_summaries(&mut self, summaries: &[ActivitySummary]) -> Result<u64> {
        let mut upsert = self
            .tx
            .prepare_cached(
                "INSERT INTO activity_summary
                     (day, active_energy_kcal, active_energy_goal_kcal, exercise_minutes,
                      exercise_goal_minutes, stand_hours, stand_goal_hours, imported_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(day) DO UPDATE SET
                     active_energy_kcal = excluded.active_energy_kcal,
                     active_energy_goal_kcal = excluded.active_energy_goal_kcal,
                     exercise_minutes = excluded.exercise_minutes,
                     exercise_goal_minutes = excluded.exercise_goal_minutes,
                     stand_hours = excluded.stand_hours,
                     stand_goal_hours = excluded.stand_goal_hours,
                     imported_at = excluded.imported_at
                 WHERE activity_summary.active_energy_kcal IS NOT excluded.active_energy_kcal
                    OR activity_summary.active_energy_goal_kcal IS NOT excluded.active_energy_goal_kcal
                    OR activity_summary.exercise_minutes IS NOT excluded.exercise_minutes
                    OR activity_summary.exercise_goal_minutes IS NOT excluded.exercise_goal_minutes
                    OR activity_summary.stand_hours IS NOT excluded.stand_hours
                    OR activity_summary.stand_goal_hours IS NOT excluded.stand_goal_hours",
            )
            .map_err(|e| HealthError::storage(format!("Failed to prepare upsert: {}", e)))?;

        let mut changed = 0;
        for summary in summaries {
            check_summary(summary)?;
            changed += upsert
                .execute(params![
                    summary.day.format(DAY_FORMAT).to_string(),
                    summary.active_energy_kcal,
                    summary.active_energy_goal_kcal,
                    summary.exercise_minutes,
                    summary.exercise_goal_minutes,
                    summary.stand_hours,
                    summary.stand_goal_hours,
                    self.imported_at,
                ])
                .map_err(|e| HealthError::storage(format!("Failed to write summary: {}", e)))?
                as u64;
        }

        self.stats.summaries += changed;
        Ok(changed)
    }

    /// Totals written so far in this transaction
    pub fn stats(&self) -> ImportStats {
        self.stats
    }

    /// Make every batch visible at once
    pub fn commit(self) -> Result<ImportStats> {
        self.tx
            .commit()
            .map_err(|e| HealthError::storage(format!("Failed to commit import: {}", e)))?;
        Ok(self.stats)
    }
}

/// Stored instants are whole seconds; round a bound up so `>=` and `<` keep
/// their meaning for a fractional instant
fn ceil_secs(instant: DateTime<Utc>) -> i64 {
    let secs = instant.timestamp();
    if instant.timestamp_subsec_nanos() > 0 {
        secs.saturating_add(1)
    } else {
        secs
    }
}

fn check_record(record: &CanonicalRecord) -> Result<()> {
    let problem = if !record.value.is_finite() {
        "value is not finite"
    } else if record.start_ts > record.end_ts {
        "start is after end"
    } else if record.start_ts.timestamp_subsec_nanos() != 0
        || record.end_ts.timestamp_subsec_nanos() != 0
    {
        "timestamps must be whole seconds"
    } else {
        return Ok(());
    };
    Err(HealthError::storage(format!(
        "Invalid {} record {}: {}",
        record.metric_id, record.record_hash, problem
    )))
}

fn check_summary(summary: &ActivitySummary) -> Result<()> {
    let values = [
        summary.active_energy_kcal,
        summary.active_energy_goal_kcal,
        summary.exercise_minutes,
        summary.exercise_goal_minutes,
        summary.stand_hours,
        summary.stand_goal_hours,
    ];
    if values.iter().flatten().all(|v| v.is_finite()) {
        return Ok(());
    }
    Err(HealthError::storage(format!(
        "Invalid activity summary for {}: value is not finite",
        summary.day
    )))
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<StoredRecord> {
    Ok(StoredRecord {
        id: row.get(0)?,
        metric_id: metric_from_row(row, 1)?,
        start_ts: timestamp_from_row(row, 2)?,
        end_ts: timestamp_from_row(row, 3)?,
        value: row.get(4)?,
        source_name: row.get(5)?,
        record_hash: row.get(6)?,
        imported_at: timestamp_from_row(row, 7)?,
    })
}

fn summary_from_row(row: &Row<'_>) -> rusqlite::Result<ActivitySummary> {
    let day: String = row.get(0)?;
    let day = NaiveDate::parse_from_str(&day, DAY_FORMAT)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e)))?;
    Ok(ActivitySummary {
        day,
        active_energy_kcal: row.get(1)?,
        active_energy_goal_kcal: row.get(2)?,
        exercise_minutes: row.get(3)?,
        exercise_goal_minutes: row.get(4)?,
        stand_hours: row.get(5)?,
        stand_goal_hours: row.get(6)?,
    })
}

fn metric_from_row(row: &Row<'_>, idx: usize) -> rusqlite::Result<MetricId> {
    let raw: String = row.get(idx)?;
    MetricId::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn timestamp_from_row(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let secs: i64 = row.get(idx)?;
    DateTime::from_timestamp(secs, 0).ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, secs))
}
