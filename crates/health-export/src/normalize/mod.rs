//! Raw export entries to canonical records
//!
//! `normalize` resolves the metric, parses timestamps, converts the value into
//! the metric's canonical unit and derives the dedup hash. Entries of metrics
//! outside [`MetricId::ALL`] come back as `Ok(None)`. Activity summaries take
//! their own path through [`normalize_summary`].

mod sleep;
mod summary;
pub mod units;

pub use sleep::SleepStage;
pub use summary::normalize_summary;
pub use units::Conversion;

use chrono::{DateTime, SecondsFormat, Utc};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::error::HealthError;
use crate::models::{CanonicalRecord, EntryKind, MetricId, RawEntry};

/// Timestamp layout used throughout the export, e.g. `2024-03-10 07:15:00 -0800`
pub const EXPORT_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S %z";

/// Metadata key under which a workout keeps its activity type
pub const WORKOUT_TYPE_KEY: &str = "workoutActivityType";

/// Why a single entry was rejected
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NormalizeError {
    #[error("unknown unit '{unit}' for {metric}")]
    Unit { metric: MetricId, unit: String },

    #[error("unparseable {field} '{value}'")]
    Timestamp { field: &'static str, value: String },

    #[error("invalid value for {metric}: {reason}")]
    Value { metric: MetricId, reason: String },

    #[error("non-finite value for {0}")]
    NonFinite(MetricId),

    #[error("start {start} is after end {end}")]
    InvertedRange {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("unknown sleep stage '{0}'")]
    CategoryValue(String),

    #[error("invalid {field} '{value}'")]
    Attribute { field: String, value: String },
}

impl From<NormalizeError> for HealthError {
    fn from(e: NormalizeError) -> Self {
        match e {
            NormalizeError::Unit { metric, unit } => HealthError::Unit {
                metric: metric.to_string(),
                unit,
            },
            other => HealthError::InvalidParameter(other.to_string()),
        }
    }
}

/// Convert one raw entry into a canonical record
pub fn normalize(entry: &RawEntry) -> Result<Option<CanonicalRecord>, NormalizeError> {
    if entry.kind == EntryKind::ActivitySummary {
        return Ok(None);
    }
    let Some(metric_id) = MetricId::from_source_tag(&entry.type_tag) else {
        return Ok(None);
    };

    let start_ts = parse_timestamp("startDate", &entry.start_date)?;
    let end_ts = parse_timestamp("endDate", &entry.end_date)?;
    if start_ts > end_ts {
        return Err(NormalizeError::InvertedRange {
            start: start_ts,
            end: end_ts,
        });
    }

    let value = match metric_id {
        MetricId::SleepStage => sleep_value(entry)?,
        MetricId::Workout => workout_duration(entry, start_ts, end_ts)?,
        _ => quantity_value(metric_id, entry)?,
    };
    if !value.is_finite() {
        return Err(NormalizeError::NonFinite(metric_id));
    }

    let mut metadata = entry.metadata.clone();
    if entry.kind == EntryKind::Workout {
        metadata.insert(WORKOUT_TYPE_KEY.to_string(), entry.type_tag.clone());
    }

    Ok(Some(CanonicalRecord {
        metric_id,
        start_ts,
        end_ts,
        value,
        record_hash: record_hash(metric_id, start_ts, end_ts, value, &entry.source_name),
        source_name: entry.source_name.clone(),
        metadata,
    }))
}

/// Deterministic identity of a canonical sample.
///
/// Lowercase hex SHA-256 over `metric|start|end|value|source`, timestamps in
/// RFC 3339 UTC at second precision and the value in Rust's shortest
/// round-trip decimal form.
pub fn record_hash(
    metric_id: MetricId,
    start_ts: DateTime<Utc>,
    end_ts: DateTime<Utc>,
    value: f64,
    source_name: &str,
) -> String {
    let key = format!(
        "{}|{}|{}|{}|{}",
        metric_id.as_str(),
        start_ts.to_rfc3339_opts(SecondsFormat::Secs, true),
        end_ts.to_rfc3339_opts(SecondsFormat::Secs, true),
        value,
        source_name
    );
    let digest = Sha256::digest(key.as_bytes());
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Parse an export timestamp into UTC.
///
/// Records are stored at whole seconds, so fractional seconds are rejected
/// rather than truncated.
pub fn parse_timestamp(field: &'static str, raw: &str) -> Result<DateTime<Utc>, NormalizeError> {
    let invalid = || NormalizeError::Timestamp {
        field,
        value: raw.to_string(),
    };
    let parsed = DateTime::parse_from_str(raw.trim(), EXPORT_DATE_FORMAT)
        .or_else(|_| DateTime::parse_from_rfc3339(raw.trim()))
        .map_err(|_| invalid())?;
    if parsed.timestamp_subsec_nanos() != 0 {
        return Err(invalid());
    }
    Ok(parsed.with_timezone(&Utc))
}

fn parse_number(metric: MetricId, raw: Option<&str>) -> Result<f64, NormalizeError> {
    let raw = raw.ok_or_else(|| NormalizeError::Value {
        metric,
        reason: "missing value".to_string(),
    })?;
    raw.trim().parse::<f64>().map_err(|_| NormalizeError::Value {
        metric,
        reason: format!("'{}' is not a number", raw),
    })
}

fn quantity_value(metric: MetricId, entry: &RawEntry) -> Result<f64, NormalizeError> {
    let unit = entry.unit.as_deref().unwrap_or_default();
    let conversion = units::conversion(metric, unit).ok_or_else(|| NormalizeError::Unit {
        metric,
        unit: unit.to_string(),
    })?;
    let raw = parse_number(metric, entry.value.as_deref())?;
    Ok(conversion.apply(raw))
}

fn sleep_value(entry: &RawEntry) -> Result<f64, NormalizeError> {
    let raw = entry.value.as_deref().unwrap_or_default();
    SleepStage::from_export_value(raw)
        .map(|stage| f64::from(stage.code()))
        .ok_or_else(|| NormalizeError::CategoryValue(raw.to_string()))
}

/// Workout duration in seconds, falling back to the wall-clock span
fn workout_duration(
    entry: &RawEntry,
    start_ts: DateTime<Utc>,
    end_ts: DateTime<Utc>,
) -> Result<f64, NormalizeError> {
    if entry.value.is_none() {
        return Ok((end_ts - start_ts).num_milliseconds() as f64 / 1000.0);
    }
    quantity_value(MetricId::Workout, entry)
}
