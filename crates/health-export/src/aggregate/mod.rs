//! Per-metric summaries over local calendar buckets
//!
//! Records are read from storage in UTC, placed into the local day, ISO week
//! or month of their start instant in the requested IANA timezone, and folded
//! into count/sum/min/max/mean/last per bucket. Buckets without records are
//! never emitted.

mod granularity;

pub use granularity::Granularity;

use std::collections::BTreeMap;

use chrono::{DateTime, Days, LocalResult, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::{HealthError, Result};
use crate::models::{MetricId, StoredRecord};
use crate::normalize::SleepStage;
use crate::storage::RecordStore;

/// Longest DST gap searched when local midnight does not exist
const MAX_GAP_MINUTES: i64 = 24 * 60;

/// What gets folded per record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Measure {
    /// The stored value in the metric's canonical unit
    #[default]
    Value,
    /// `end - start` in seconds, e.g. hours slept
    Duration,
}

/// Half-open UTC interval `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if start > end {
            return Err(HealthError::invalid_param(format!(
                "range start {} is after end {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    /// Inclusive local dates `from..=to` as a UTC range, midnights resolved through DST
    pub fn local_dates(tz: &Tz, from: NaiveDate, to: NaiveDate) -> Result<Self> {
        if from > to {
            return Err(HealthError::invalid_param(format!(
                "from date {} is after to date {}",
                from, to
            )));
        }
        let after = to
            .checked_add_days(Days::new(1))
            .ok_or_else(|| HealthError::invalid_param(format!("date {} out of range", to)))?;
        Self::new(local_midnight(tz, from), local_midnight(tz, after))
    }
}

/// A summary request
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateRequest {
    pub metric: MetricId,
    pub granularity: Granularity,
    pub timezone: String,
    pub range: Option<TimeRange>,
    pub measure: Measure,
    /// Sleep only: drop in-bed and awake intervals
    pub asleep_only: bool,
}

impl AggregateRequest {
    pub fn new(metric: MetricId, granularity: Granularity, timezone: impl Into<String>) -> Self {
        Self {
            metric,
            granularity,
            timezone: timezone.into(),
            range: None,
            measure: Measure::Value,
            asleep_only: false,
        }
    }

    pub fn with_range(mut self, range: TimeRange) -> Self {
        self.range = Some(range);
        self
    }

    pub fn with_measure(mut self, measure: Measure) -> Self {
        self.measure = measure;
        self
    }

    pub fn with_asleep_only(mut self) -> Self {
        self.asleep_only = true;
        self
    }
}

/// Summary of one non-empty bucket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateBucket {
    pub metric_id: MetricId,
    /// Local date of the bucket's first day
    pub bucket_start: NaiveDate,
    /// Instant of that day's local midnight
    pub bucket_start_utc: DateTime<Utc>,
    pub granularity: Granularity,
    pub timezone_id: String,
    pub measure: Measure,
    pub count: u64,
    pub sum: f64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    /// Value of the record with the latest start
    pub last: f64,
}

impl AggregateBucket {
    pub fn label(&self) -> String {
        self.granularity.bucket_label(self.bucket_start)
    }

    /// The figure a dashboard would show for this metric: sum, mean or last
    pub fn headline(&self) -> f64 {
        if self.measure == Measure::Duration {
            return self.sum;
        }
        match self.metric_id.statistic() {
            crate::models::Statistic::Sum => self.sum,
            crate::models::Statistic::Mean => self.mean,
            crate::models::Statistic::Last => self.last,
        }
    }
}

/// Resolve an IANA timezone id
pub fn parse_timezone(id: &str) -> Result<Tz> {
    id.parse::<Tz>()
        .map_err(|_| HealthError::InvalidTimezone(id.to_string()))
}

/// Instant of local midnight on `date`.
///
/// An ambiguous midnight (clocks fall back over it) resolves to the earlier
/// instant; a midnight inside a DST gap resolves to the first valid instant
/// after the gap.
pub fn local_midnight(tz: &Tz, date: NaiveDate) -> DateTime<Utc> {
    let midnight = date.and_time(NaiveTime::MIN);

    for minute in 0..=MAX_GAP_MINUTES {
        let local = midnight + chrono::Duration::minutes(minute);
        match tz.from_local_datetime(&local) {
            LocalResult::Single(dt) => return dt.with_timezone(&Utc),
            LocalResult::Ambiguous(earliest, _) => return earliest.with_timezone(&Utc),
            LocalResult::None => continue,
        }
    }

    // No zone has a gap this long; fall back to the UTC reading
    midnight.and_utc()
}

/// Summarize `metric` into calendar buckets of `timezone_id`
pub fn aggregate(
    store: &RecordStore,
    metric: MetricId,
    granularity: Granularity,
    timezone_id: &str,
    range: Option<TimeRange>,
) -> Result<Vec<AggregateBucket>> {
    let mut request = AggregateRequest::new(metric, granularity, timezone_id);
    request.range = range;
    aggregate_with(store, &request)
}

/// Summarize according to a full request
pub fn aggregate_with(store: &RecordStore, request: &AggregateRequest) -> Result<Vec<AggregateBucket>> {
    let tz = parse_timezone(&request.timezone)?;
    if request.asleep_only && request.metric != MetricId::SleepStage {
        return Err(HealthError::invalid_param(format!(
            "asleep filter applies to {} only, not {}",
            MetricId::SleepStage,
            request.metric
        )));
    }

    let records = match request.range {
        Some(range) => store.query_range(request.metric, range.start, range.end)?,
        None => store.query_all(request.metric)?,
    };
    tracing::debug!(
        metric = %request.metric,
        granularity = %request.granularity,
        timezone = %request.timezone,
        records = records.len(),
        "Aggregating"
    );

    Ok(bucketize(&records, request, &tz))
}

/// Fold records, ordered by start, into buckets ordered by start date
fn bucketize(records: &[StoredRecord], request: &AggregateRequest, tz: &Tz) -> Vec<AggregateBucket> {
    let mut buckets: BTreeMap<NaiveDate, Accumulator> = BTreeMap::new();

    for record in records {
        if request.asleep_only && !is_asleep(record) {
            continue;
        }
        let local_date = record.start_ts.with_timezone(tz).date_naive();
        let start = request.granularity.bucket_start(local_date);
        let value = match request.measure {
            Measure::Value => record.value,
            Measure::Duration => record.duration_secs(),
        };
        buckets.entry(start).or_default().push(value);
    }

    buckets
        .into_iter()
        .map(|(bucket_start, acc)| AggregateBucket {
            metric_id: request.metric,
            bucket_start,
            bucket_start_utc: local_midnight(tz, bucket_start),
            granularity: request.granularity,
            timezone_id: request.timezone.clone(),
            measure: request.measure,
            count: acc.count,
            sum: acc.sum,
            min: acc.min,
            max: acc.max,
            mean: acc.sum / acc.count as f64,
            last: acc.last,
        })
        .collect()
}

/// Sleep records keep their stage code as value
fn is_asleep(record: &StoredRecord) -> bool {
    SleepStage::from_code(record.value as u8).is_some_and(|stage| stage.is_asleep())
}

#[derive(Debug, Clone, Copy)]
struct Accumulator {
    count: u64,
    sum: f64,
    min: f64,
    max: f64,
    last: f64,
}

impl Default for Accumulator {
    fn default() -> Self {
        Self {
            count: 0,
            sum: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            last: 0.0,
        }
    }
}

impl Accumulator {
    fn push(&mut self, value: f64) {
        self.count += 1;
        self.sum += value;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        self.last = value;
    }
}
