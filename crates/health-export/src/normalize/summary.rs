//! `<ActivitySummary>` entries to daily ring totals

use chrono::NaiveDate;

use super::{units, NormalizeError};
use crate::models::{ActivitySummary, EntryKind, MetricId, RawEntry};

const JOULES_PER_KCAL: f64 = 4184.0;

const ENERGY_UNIT_KEY: &str = "activeEnergyBurnedUnit";

/// Convert an activity summary entry into ring totals.
///
/// Every ring attribute is optional; a present one must be a finite number.
pub fn normalize_summary(entry: &RawEntry) -> Result<ActivitySummary, NormalizeError> {
    if entry.kind != EntryKind::ActivitySummary {
        return Err(NormalizeError::Attribute {
            field: "kind".to_string(),
            value: entry.type_tag.clone(),
        });
    }

    let day = NaiveDate::parse_from_str(entry.start_date.trim(), "%Y-%m-%d").map_err(|_| {
        NormalizeError::Timestamp {
            field: "dateComponents",
            value: entry.start_date.clone(),
        }
    })?;

    Ok(ActivitySummary {
        day,
        active_energy_kcal: energy_kcal(entry, ring_value(entry, "activeEnergyBurned")?)?,
        active_energy_goal_kcal: energy_kcal(entry, ring_value(entry, "activeEnergyBurnedGoal")?)?,
        exercise_minutes: ring_value(entry, "appleExerciseTime")?,
        exercise_goal_minutes: ring_value(entry, "appleExerciseTimeGoal")?,
        stand_hours: ring_value(entry, "appleStandHours")?,
        stand_goal_hours: ring_value(entry, "appleStandHoursGoal")?,
    })
}

fn ring_value(entry: &RawEntry, key: &str) -> Result<Option<f64>, NormalizeError> {
    let Some(raw) = entry.metadata.get(key) else {
        return Ok(None);
    };
    match raw.trim().parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(Some(value)),
        _ => Err(NormalizeError::Attribute {
            field: key.to_string(),
            value: raw.clone(),
        }),
    }
}

/// Move ring energy in kcal; the export states its unit once per summary
fn energy_kcal(entry: &RawEntry, value: Option<f64>) -> Result<Option<f64>, NormalizeError> {
    let Some(value) = value else {
        return Ok(None);
    };
    match entry.metadata.get(ENERGY_UNIT_KEY).map(String::as_str) {
        None | Some("kcal") | Some("Cal") => Ok(Some(value)),
        Some(unit) => units::conversion(MetricId::ActiveEnergy, unit)
            .map(|conversion| Some(conversion.apply(value) / JOULES_PER_KCAL))
            .ok_or_else(|| NormalizeError::Unit {
                metric: MetricId::ActiveEnergy,
                unit: unit.to_string(),
            }),
    }
}
