//! Unit conversion table
//!
//! Every `(metric, unit)` pair the export is known to use maps to an affine
//! conversion into the metric's canonical unit. A pair missing from the table
//! is an error, never an implicit factor of 1.

use crate::models::MetricId;

/// `canonical = raw * scale + offset`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Conversion {
    pub scale: f64,
    pub offset: f64,
}

impl Conversion {
    const fn factor(scale: f64) -> Self {
        Self { scale, offset: 0.0 }
    }

    const fn affine(scale: f64, offset: f64) -> Self {
        Self { scale, offset }
    }

    pub fn apply(&self, raw: f64) -> f64 {
        raw * self.scale + self.offset
    }
}

const IDENTITY: Conversion = Conversion::factor(1.0);

const METER: &[(&str, Conversion)] = &[
    ("m", IDENTITY),
    ("cm", Conversion::factor(0.01)),
    ("km", Conversion::factor(1000.0)),
    ("in", Conversion::factor(0.0254)),
    ("ft", Conversion::factor(0.3048)),
    ("yd", Conversion::factor(0.9144)),
    ("mi", Conversion::factor(1609.344)),
];

const JOULE: &[(&str, Conversion)] = &[
    ("J", IDENTITY),
    ("kJ", Conversion::factor(1000.0)),
    ("cal", Conversion::factor(4.184)),
    ("kcal", Conversion::factor(4184.0)),
    ("Cal", Conversion::factor(4184.0)),
];

const SECOND: &[(&str, Conversion)] = &[
    ("ms", Conversion::factor(0.001)),
    ("s", IDENTITY),
    ("min", Conversion::factor(60.0)),
    ("hr", Conversion::factor(3600.0)),
    ("d", Conversion::factor(86_400.0)),
];

const PER_MINUTE: &[(&str, Conversion)] = &[
    ("count/min", IDENTITY),
    ("count/s", Conversion::factor(60.0)),
];

const KILOGRAM: &[(&str, Conversion)] = &[
    ("kg", IDENTITY),
    ("g", Conversion::factor(0.001)),
    ("lb", Conversion::factor(0.453_592_37)),
    ("oz", Conversion::factor(0.028_349_523_125)),
    ("st", Conversion::factor(6.350_293_18)),
];

const CELSIUS: &[(&str, Conversion)] = &[
    ("degC", IDENTITY),
    ("degF", Conversion::affine(5.0 / 9.0, -160.0 / 9.0)),
    ("K", Conversion::affine(1.0, -273.15)),
];

const COUNT: &[(&str, Conversion)] = &[("count", IDENTITY)];

/// Apple stores percentages as fractions in `[0, 1]` with unit `%`
const FRACTION: &[(&str, Conversion)] = &[("%", IDENTITY)];

/// Units accepted for a metric; empty for unit-less category metrics
pub fn units_for(metric: MetricId) -> &'static [(&'static str, Conversion)] {
    match metric {
        MetricId::Steps | MetricId::FlightsClimbed | MetricId::BodyMassIndex => COUNT,
        MetricId::DistanceWalkingRunning | MetricId::DistanceCycling | MetricId::Height => METER,
        MetricId::ActiveEnergy | MetricId::BasalEnergy => JOULE,
        MetricId::ExerciseTime
        | MetricId::StandTime
        | MetricId::HeartRateVariability
        | MetricId::Workout => SECOND,
        MetricId::HeartRate
        | MetricId::RestingHeartRate
        | MetricId::WalkingHeartRateAverage
        | MetricId::RespiratoryRate => PER_MINUTE,
        MetricId::OxygenSaturation | MetricId::BodyFatPercentage => FRACTION,
        MetricId::BodyMass => KILOGRAM,
        MetricId::BodyTemperature => CELSIUS,
        MetricId::SleepStage => &[],
    }
}

/// Look up the conversion for a metric and unit string
pub fn conversion(metric: MetricId, unit: &str) -> Option<Conversion> {
    units_for(metric)
        .iter()
        .find(|(name, _)| *name == unit)
        .map(|(_, conversion)| *conversion)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn convert(metric: MetricId, unit: &str, raw: f64) -> f64 {
        conversion(metric, unit).unwrap().apply(raw)
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-9 * expected.abs().max(1.0),
            "{} != {}",
            actual,
            expected
        );
    }

    #[test]
    fn test_every_quantity_metric_has_its_canonical_unit() {
        for metric in MetricId::ALL {
            if metric == MetricId::SleepStage {
                assert!(units_for(metric).is_empty());
                continue;
            }
            let units = units_for(metric);
            assert!(!units.is_empty(), "{} has no units", metric);
            // The identity conversion belongs to the canonical unit, or "%" and "count" stand-ins
            assert!(units.iter().any(|(_, c)| *c == IDENTITY), "{} has no identity unit", metric);
        }
    }

    #[test]
    fn test_unit_names_unique_per_metric() {
        for metric in MetricId::ALL {
            let mut names: Vec<&str> = units_for(metric).iter().map(|(n, _)| *n).collect();
            let len = names.len();
            names.sort_unstable();
            names.dedup();
            assert_eq!(names.len(), len, "duplicate unit for {}", metric);
        }
    }

    #[test]
    fn test_distance() {
        assert_close(convert(MetricId::DistanceWalkingRunning, "km", 5.1), 5100.0);
        assert_close(convert(MetricId::DistanceWalkingRunning, "mi", 1.0), 1609.344);
        assert_close(convert(MetricId::DistanceCycling, "m", 12.5), 12.5);
        assert_close(convert(MetricId::Height, "cm", 180.0), 1.8);
        assert_close(convert(MetricId::Height, "in", 70.0), 1.778);
    }

    #[test]
    fn test_energy() {
        assert_close(convert(MetricId::ActiveEnergy, "kcal", 1.0), 4184.0);
        assert_close(convert(MetricId::ActiveEnergy, "Cal", 2.0), 8368.0);
        assert_close(convert(MetricId::BasalEnergy, "kJ", 1.5), 1500.0);
    }

    #[test]
    fn test_time() {
        assert_close(convert(MetricId::ExerciseTime, "min", 30.0), 1800.0);
        assert_close(convert(MetricId::Workout, "hr", 1.5), 5400.0);
        assert_close(convert(MetricId::HeartRateVariability, "ms", 45.0), 0.045);
    }

    #[test]
    fn test_mass_and_temperature() {
        assert_close(convert(MetricId::BodyMass, "lb", 100.0), 45.359237);
        assert_close(convert(MetricId::BodyMass, "st", 10.0), 63.5029318);
        assert_close(convert(MetricId::BodyTemperature, "degF", 98.6), 37.0);
        assert_close(convert(MetricId::BodyTemperature, "degF", 32.0), 0.0);
        assert_close(convert(MetricId::BodyTemperature, "K", 310.15), 37.0);
    }

    #[test]
    fn test_rates() {
        assert_close(convert(MetricId::HeartRate, "count/min", 62.0), 62.0);
        assert_close(convert(MetricId::RespiratoryRate, "count/s", 0.25), 15.0);
    }

    #[test]
    fn test_unknown_units() {
        assert!(conversion(MetricId::Steps, "km").is_none());
        assert!(conversion(MetricId::BodyMass, "furlong").is_none());
        assert!(conversion(MetricId::HeartRate, "").is_none());
        assert!(conversion(MetricId::SleepStage, "count").is_none());
    }
}
