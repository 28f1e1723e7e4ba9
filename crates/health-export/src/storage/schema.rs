//! Database schema and version check

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{HealthError, Result};

/// Current schema version, stored in `meta.schema_version`
pub const SCHEMA_VERSION: i64 = 1;

const VERSION_KEY: &str = "schema_version";

/// Tables owned by this schema; finding one without a version row means the
/// file was written by something else
const HEALTH_TABLES: [&str; 3] = ["health_record", "record_metadata", "activity_summary"];

/// Create the schema on a fresh database or verify the version of an existing one.
///
/// There is no automatic migration: a different version is a `Schema` error.
pub fn migrate(conn: &Connection) -> Result<()> {
    if table_exists(conn, "meta")? {
        let found: Option<String> = conn
            .query_row(
                "SELECT value FROM meta WHERE key = ?",
                params![VERSION_KEY],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| HealthError::storage(format!("Failed to read schema version: {}", e)))?;

        return match found {
            Some(version) if version == SCHEMA_VERSION.to_string() => Ok(()),
            Some(version) => Err(HealthError::Schema {
                found: version,
                expected: SCHEMA_VERSION,
            }),
            None => Err(HealthError::Schema {
                found: "none".to_string(),
                expected: SCHEMA_VERSION,
            }),
        };
    }

    for table in HEALTH_TABLES {
        if table_exists(conn, table)? {
            return Err(HealthError::Schema {
                found: "none".to_string(),
                expected: SCHEMA_VERSION,
            });
        }
    }

    create_v1(conn)
}

/// Initial schema
fn create_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(&format!(
        r#"
        BEGIN IMMEDIATE;

        CREATE TABLE IF NOT EXISTS meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS health_record (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            metric_id TEXT NOT NULL,
            start_ts INTEGER NOT NULL,
            end_ts INTEGER NOT NULL,
            value REAL NOT NULL,
            source_name TEXT NOT NULL,
            record_hash TEXT NOT NULL UNIQUE,
            imported_at INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_health_record_metric_start
        ON health_record(metric_id, start_ts);

        CREATE TABLE IF NOT EXISTS record_metadata (
            record_hash TEXT NOT NULL,
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            UNIQUE(record_hash, key)
        );

        -- One row per day, `YYYY-MM-DD`; a later export replaces the totals
        CREATE TABLE IF NOT EXISTS activity_summary (
            day TEXT PRIMARY KEY,
            active_energy_kcal REAL,
            active_energy_goal_kcal REAL,
            exercise_minutes REAL,
            exercise_goal_minutes REAL,
            stand_hours REAL,
            stand_goal_hours REAL,
            imported_at INTEGER NOT NULL
        );

        INSERT OR IGNORE INTO meta (key, value) VALUES ('{}', '{}');

        COMMIT;
        "#,
        VERSION_KEY, SCHEMA_VERSION
    ))
    .map_err(|e| HealthError::storage(format!("Failed to create schema: {}", e)))
}

fn table_exists(conn: &Connection, name: &str) -> Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?)",
        params![name],
        |row| row.get(0),
    )
    .map_err(|e| HealthError::storage(format!("Failed to inspect schema: {}", e)))
}
