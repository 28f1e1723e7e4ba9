//! Closed set of metrics the importer understands

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::HealthError;

/// Tag prefix shared by every workout activity type in the export
pub const WORKOUT_TAG_PREFIX: &str = "HKWorkoutActivityType";

/// Supported metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricId {
    Steps,
    DistanceWalkingRunning,
    DistanceCycling,
    FlightsClimbed,
    ActiveEnergy,
    BasalEnergy,
    ExerciseTime,
    StandTime,
    HeartRate,
    RestingHeartRate,
    WalkingHeartRateAverage,
    HeartRateVariability,
    RespiratoryRate,
    OxygenSaturation,
    BodyMass,
    BodyMassIndex,
    BodyFatPercentage,
    Height,
    BodyTemperature,
    SleepStage,
    Workout,
}

/// Statistic that best summarizes a metric over a day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Statistic {
    Sum,
    Mean,
    Last,
}

impl MetricId {
    pub const ALL: [MetricId; 21] = [
        MetricId::Steps,
        MetricId::DistanceWalkingRunning,
        MetricId::DistanceCycling,
        MetricId::FlightsClimbed,
        MetricId::ActiveEnergy,
        MetricId::BasalEnergy,
        MetricId::ExerciseTime,
        MetricId::StandTime,
        MetricId::HeartRate,
        MetricId::RestingHeartRate,
        MetricId::WalkingHeartRateAverage,
        MetricId::HeartRateVariability,
        MetricId::RespiratoryRate,
        MetricId::OxygenSaturation,
        MetricId::BodyMass,
        MetricId::BodyMassIndex,
        MetricId::BodyFatPercentage,
        MetricId::Height,
        MetricId::BodyTemperature,
        MetricId::SleepStage,
        MetricId::Workout,
    ];

    /// Stable identifier used in the database and on the command line
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricId::Steps => "steps",
            MetricId::DistanceWalkingRunning => "distance_walking_running",
            MetricId::DistanceCycling => "distance_cycling",
            MetricId::FlightsClimbed => "flights_climbed",
            MetricId::ActiveEnergy => "active_energy",
            MetricId::BasalEnergy => "basal_energy",
            MetricId::ExerciseTime => "exercise_time",
            MetricId::StandTime => "stand_time",
            MetricId::HeartRate => "heart_rate",
            MetricId::RestingHeartRate => "resting_heart_rate",
            MetricId::WalkingHeartRateAverage => "walking_heart_rate_average",
            MetricId::HeartRateVariability => "heart_rate_variability",
            MetricId::RespiratoryRate => "respiratory_rate",
            MetricId::OxygenSaturation => "oxygen_saturation",
            MetricId::BodyMass => "body_mass",
            MetricId::BodyMassIndex => "body_mass_index",
            MetricId::BodyFatPercentage => "body_fat_percentage",
            MetricId::Height => "height",
            MetricId::BodyTemperature => "body_temperature",
            MetricId::SleepStage => "sleep_stage",
            MetricId::Workout => "workout",
        }
    }

    /// HealthKit type identifier this metric is read from.
    ///
    /// Workouts match any `HKWorkoutActivityType*` tag; the prefix is returned here.
    pub fn source_tag(&self) -> &'static str {
        match self {
            MetricId::Steps => "HKQuantityTypeIdentifierStepCount",
            MetricId::DistanceWalkingRunning => "HKQuantityTypeIdentifierDistanceWalkingRunning",
            MetricId::DistanceCycling => "HKQuantityTypeIdentifierDistanceCycling",
            MetricId::FlightsClimbed => "HKQuantityTypeIdentifierFlightsClimbed",
            MetricId::ActiveEnergy => "HKQuantityTypeIdentifierActiveEnergyBurned",
            MetricId::BasalEnergy => "HKQuantityTypeIdentifierBasalEnergyBurned",
            MetricId::ExerciseTime => "HKQuantityTypeIdentifierAppleExerciseTime",
            MetricId::StandTime => "HKQuantityTypeIdentifierAppleStandTime",
            MetricId::HeartRate => "HKQuantityTypeIdentifierHeartRate",
            MetricId::RestingHeartRate => "HKQuantityTypeIdentifierRestingHeartRate",
            MetricId::WalkingHeartRateAverage => "HKQuantityTypeIdentifierWalkingHeartRateAverage",
            MetricId::HeartRateVariability => "HKQuantityTypeIdentifierHeartRateVariabilitySDNN",
            MetricId::RespiratoryRate => "HKQuantityTypeIdentifierRespiratoryRate",
            MetricId::OxygenSaturation => "HKQuantityTypeIdentifierOxygenSaturation",
            MetricId::BodyMass => "HKQuantityTypeIdentifierBodyMass",
            MetricId::BodyMassIndex => "HKQuantityTypeIdentifierBodyMassIndex",
            MetricId::BodyFatPercentage => "HKQuantityTypeIdentifierBodyFatPercentage",
            MetricId::Height => "HKQuantityTypeIdentifierHeight",
            MetricId::BodyTemperature => "HKQuantityTypeIdentifierBodyTemperature",
            MetricId::SleepStage => "HKCategoryTypeIdentifierSleepAnalysis",
            MetricId::Workout => WORKOUT_TAG_PREFIX,
        }
    }

    /// Map an export type tag to a metric, `None` for anything outside the supported set
    pub fn from_source_tag(tag: &str) -> Option<Self> {
        if tag.starts_with(WORKOUT_TAG_PREFIX) {
            return Some(MetricId::Workout);
        }
        Self::ALL
            .iter()
            .copied()
            .filter(|m| *m != MetricId::Workout)
            .find(|m| m.source_tag() == tag)
    }

    /// Unit values are stored in after normalization
    pub fn canonical_unit(&self) -> &'static str {
        match self {
            MetricId::Steps | MetricId::FlightsClimbed | MetricId::BodyMassIndex => "count",
            MetricId::DistanceWalkingRunning | MetricId::DistanceCycling | MetricId::Height => "m",
            MetricId::ActiveEnergy | MetricId::BasalEnergy => "J",
            MetricId::ExerciseTime
            | MetricId::StandTime
            | MetricId::HeartRateVariability
            | MetricId::Workout => "s",
            MetricId::HeartRate
            | MetricId::RestingHeartRate
            | MetricId::WalkingHeartRateAverage
            | MetricId::RespiratoryRate => "count/min",
            MetricId::OxygenSaturation | MetricId::BodyFatPercentage => "fraction",
            MetricId::BodyMass => "kg",
            MetricId::BodyTemperature => "degC",
            MetricId::SleepStage => "stage",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            MetricId::Steps => "Steps",
            MetricId::DistanceWalkingRunning => "Walking + Running Distance",
            MetricId::DistanceCycling => "Cycling Distance",
            MetricId::FlightsClimbed => "Flights Climbed",
            MetricId::ActiveEnergy => "Active Energy",
            MetricId::BasalEnergy => "Basal Energy",
            MetricId::ExerciseTime => "Exercise Time",
            MetricId::StandTime => "Stand Time",
            MetricId::HeartRate => "Heart Rate",
            MetricId::RestingHeartRate => "Resting Heart Rate",
            MetricId::WalkingHeartRateAverage => "Walking HR Avg",
            MetricId::HeartRateVariability => "HRV (SDNN)",
            MetricId::RespiratoryRate => "Respiratory Rate",
            MetricId::OxygenSaturation => "Blood Oxygen",
            MetricId::BodyMass => "Weight",
            MetricId::BodyMassIndex => "BMI",
            MetricId::BodyFatPercentage => "Body Fat",
            MetricId::Height => "Height",
            MetricId::BodyTemperature => "Body Temperature",
            MetricId::SleepStage => "Sleep",
            MetricId::Workout => "Workouts",
        }
    }

    pub fn category(&self) -> &'static str {
        match self {
            MetricId::Steps
            | MetricId::DistanceWalkingRunning
            | MetricId::DistanceCycling
            | MetricId::FlightsClimbed
            | MetricId::ActiveEnergy
            | MetricId::BasalEnergy
            | MetricId::ExerciseTime
            | MetricId::StandTime
            | MetricId::Workout => "Activity",
            MetricId::HeartRate
            | MetricId::RestingHeartRate
            | MetricId::WalkingHeartRateAverage
            | MetricId::HeartRateVariability => "Heart",
            MetricId::RespiratoryRate | MetricId::OxygenSaturation => "Respiratory",
            MetricId::BodyMass
            | MetricId::BodyMassIndex
            | MetricId::BodyFatPercentage
            | MetricId::Height
            | MetricId::BodyTemperature => "Body",
            MetricId::SleepStage => "Sleep",
        }
    }

    /// Daily statistic to show for this metric.
    ///
    /// Sleep is summed over interval durations rather than stage codes.
    pub fn statistic(&self) -> Statistic {
        match self {
            MetricId::HeartRate
            | MetricId::RestingHeartRate
            | MetricId::WalkingHeartRateAverage
            | MetricId::HeartRateVariability
            | MetricId::RespiratoryRate
            | MetricId::OxygenSaturation
            | MetricId::BodyTemperature => Statistic::Mean,
            MetricId::BodyMass
            | MetricId::BodyMassIndex
            | MetricId::BodyFatPercentage
            | MetricId::Height => Statistic::Last,
            _ => Statistic::Sum,
        }
    }
}

impl fmt::Display for MetricId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricId {
    type Err = HealthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| HealthError::invalid_param(format!("unknown metric '{}'", s)))
    }
}
