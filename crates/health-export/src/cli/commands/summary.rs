//! Summary command for health

use std::path::Path;

use chrono::{DateTime, Days, Utc};

use crate::aggregate::{
    aggregate_with, local_midnight, parse_timezone, AggregateBucket, AggregateRequest,
    Granularity, Measure, TimeRange,
};
use crate::cli::{open_existing, parse_date, print_json, OutputFormat};
use crate::error::{HealthError, Result};
use crate::models::{MetricId, Statistic};

/// Options of `health summary`
#[derive(Debug, Clone)]
pub struct SummaryArgs {
    pub metric: MetricId,
    pub by: Granularity,
    pub tz: String,
    pub from: Option<String>,
    pub to: Option<String>,
    pub durations: bool,
    pub asleep: bool,
}

/// Show per-bucket statistics for one metric
pub fn run(db_path: &Path, args: SummaryArgs, format: OutputFormat) -> Result<()> {
    let tz = parse_timezone(&args.tz)?;
    let range = resolve_range(&tz, args.from.as_deref(), args.to.as_deref())?;

    let Some(store) = open_existing(db_path)? else {
        return Ok(());
    };

    let mut request = AggregateRequest::new(args.metric, args.by, &args.tz);
    request.range = range;
    if args.durations {
        request.measure = Measure::Duration;
    }
    request.asleep_only = args.asleep;
    let buckets = aggregate_with(&store, &request)?;

    match format {
        OutputFormat::Json => print_json(&buckets),
        OutputFormat::Table => {
            print_table(&request, &buckets);
            Ok(())
        }
    }
}

/// Turn optional inclusive local dates into a UTC range
fn resolve_range(
    tz: &chrono_tz::Tz,
    from: Option<&str>,
    to: Option<&str>,
) -> Result<Option<TimeRange>> {
    let from = from.map(parse_date).transpose()?;
    let to = to.map(parse_date).transpose()?;

    match (from, to) {
        (None, None) => Ok(None),
        (Some(from), Some(to)) => TimeRange::local_dates(tz, from, to).map(Some),
        (Some(from), None) => TimeRange::new(local_midnight(tz, from), DateTime::<Utc>::MAX_UTC).map(Some),
        (None, Some(to)) => {
            let after = to
                .checked_add_days(Days::new(1))
                .ok_or_else(|| HealthError::InvalidDateFormat(to.to_string()))?;
            TimeRange::new(DateTime::<Utc>::MIN_UTC, local_midnight(tz, after)).map(Some)
        }
    }
}

fn print_table(request: &AggregateRequest, buckets: &[AggregateBucket]) {
    let metric = request.metric;
    let (unit, scale) = match request.measure {
        Measure::Duration => ("hours", 1.0 / 3600.0),
        Measure::Value => (metric.canonical_unit(), 1.0),
    };

    println!(
        "{} ({}) by {} in {}",
        metric.label(),
        unit,
        request.granularity,
        request.timezone
    );
    println!();

    if buckets.is_empty() {
        println!("No {} records in range", metric);
        return;
    }

    let heading = headline_heading(request);
    println!(
        "{:<12} {:>8} {:>12} {:>12} {:>12}",
        "Bucket", "Count", heading, "Min", "Max"
    );
    println!("{}", "-".repeat(60));

    let mut total_count = 0;
    let mut total_sum = 0.0;
    for bucket in buckets {
        println!(
            "{:<12} {:>8} {:>12.2} {:>12.2} {:>12.2}",
            bucket.label(),
            bucket.count,
            bucket.headline() * scale,
            bucket.min * scale,
            bucket.max * scale
        );
        total_count += bucket.count;
        total_sum += bucket.sum;
    }

    println!("{}", "-".repeat(60));
    if heading == "Total" {
        println!("{:<12} {:>8} {:>12.2}", "Total", total_count, total_sum * scale);
    } else {
        println!("{:<12} {:>8}", "Total", total_count);
    }
}

/// Column heading for [`AggregateBucket::headline`]
fn headline_heading(request: &AggregateRequest) -> &'static str {
    if request.measure == Measure::Duration {
        return "Total";
    }
    match request.metric.statistic() {
        Statistic::Sum => "Total",
        Statistic::Mean => "Mean",
        Statistic::Last => "Last",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_resolve_range() {
        let tz = parse_timezone("Europe/Amsterdam").unwrap();
        assert_eq!(resolve_range(&tz, None, None).unwrap(), None);

        let range = resolve_range(&tz, Some("2024-01-01"), Some("2024-01-31"))
            .unwrap()
            .unwrap();
        assert_eq!(range.start, Utc.with_ymd_and_hms(2023, 12, 31, 23, 0, 0).unwrap());
        assert_eq!(range.end, Utc.with_ymd_and_hms(2024, 1, 31, 23, 0, 0).unwrap());

        let open_end = resolve_range(&tz, Some("2024-01-01"), None).unwrap().unwrap();
        assert_eq!(open_end.end, DateTime::<Utc>::MAX_UTC);

        let open_start = resolve_range(&tz, None, Some("2024-01-31")).unwrap().unwrap();
        assert_eq!(open_start.start, DateTime::<Utc>::MIN_UTC);
    }

    #[test]
    fn test_headline_heading() {
        let steps = AggregateRequest::new(MetricId::Steps, Granularity::Day, "UTC");
        assert_eq!(headline_heading(&steps), "Total");

        let hr = AggregateRequest::new(MetricId::HeartRate, Granularity::Day, "UTC");
        assert_eq!(headline_heading(&hr), "Mean");

        let weight = AggregateRequest::new(MetricId::BodyMass, Granularity::Week, "UTC");
        assert_eq!(headline_heading(&weight), "Last");

        let sleep = AggregateRequest::new(MetricId::SleepStage, Granularity::Day, "UTC")
            .with_measure(Measure::Duration);
        assert_eq!(headline_heading(&sleep), "Total");
    }

    #[test]
    fn test_resolve_range_errors() {
        let tz = parse_timezone("UTC").unwrap();
        assert!(matches!(
            resolve_range(&tz, Some("January"), None),
            Err(HealthError::InvalidDateFormat(_))
        ));
        assert!(resolve_range(&tz, Some("2024-02-01"), Some("2024-01-01")).is_err());
    }
}
