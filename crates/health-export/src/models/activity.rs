//! Daily Activity ring totals

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One `<ActivitySummary>` day, in the units the Activity app shows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivitySummary {
    /// Calendar day the rings belong to (`dateComponents`)
    pub day: NaiveDate,
    /// Move ring, kcal
    pub active_energy_kcal: Option<f64>,
    pub active_energy_goal_kcal: Option<f64>,
    /// Exercise ring, minutes
    pub exercise_minutes: Option<f64>,
    pub exercise_goal_minutes: Option<f64>,
    /// Stand ring, hours
    pub stand_hours: Option<f64>,
    pub stand_goal_hours: Option<f64>,
}

impl ActivitySummary {
    pub fn new(day: NaiveDate) -> Self {
        Self {
            day,
            active_energy_kcal: None,
            active_energy_goal_kcal: None,
            exercise_minutes: None,
            exercise_goal_minutes: None,
            stand_hours: None,
            stand_goal_hours: None,
        }
    }

    /// Rings whose value reached a positive goal
    pub fn closed_rings(&self) -> u8 {
        [
            (self.active_energy_kcal, self.active_energy_goal_kcal),
            (self.exercise_minutes, self.exercise_goal_minutes),
            (self.stand_hours, self.stand_goal_hours),
        ]
        .into_iter()
        .filter(|ring| matches!(ring, (Some(value), Some(goal)) if *goal > 0.0 && value >= goal))
        .count() as u8
    }
}
