//! Activity ring command for health

use std::path::Path;

use crate::cli::{open_existing, parse_date, print_json, OutputFormat};
use crate::error::{HealthError, Result};

/// Show daily ring totals between two optional inclusive days
pub fn run(db_path: &Path, from: Option<&str>, to: Option<&str>, format: OutputFormat) -> Result<()> {
    let from = from.map(parse_date).transpose()?;
    let to = to.map(parse_date).transpose()?;
    if let (Some(from), Some(to)) = (from, to) {
        if from > to {
            return Err(HealthError::invalid_param(format!(
                "from date {} is after to date {}",
                from, to
            )));
        }
    }

    let Some(store) = open_existing(db_path)? else {
        return Ok(());
    };
    let days = store.activity_summaries(from, to)?;

    if format == OutputFormat::Json {
        return print_json(&days);
    }

    if days.is_empty() {
        println!("No activity summaries in range");
        return Ok(());
    }

    println!(
        "{:<12} {:>16} {:>16} {:>12} {:>7}",
        "Day", "Move (kcal)", "Exercise (min)", "Stand (h)", "Closed"
    );
    println!("{}", "-".repeat(67));
    for day in &days {
        println!(
            "{:<12} {:>16} {:>16} {:>12} {:>7}",
            day.day.format("%Y-%m-%d"),
            ring(day.active_energy_kcal, day.active_energy_goal_kcal),
            ring(day.exercise_minutes, day.exercise_goal_minutes),
            ring(day.stand_hours, day.stand_goal_hours),
            format!("{}/3", day.closed_rings())
        );
    }

    let closed_all = days.iter().filter(|d| d.closed_rings() == 3).count();
    println!("{}", "-".repeat(67));
    println!("{} days, all rings closed on {}", days.len(), closed_all);

    Ok(())
}

/// `value/goal`, with `-` for a missing side
fn ring(value: Option<f64>, goal: Option<f64>) -> String {
    let show = |v: Option<f64>| v.map_or_else(|| "-".to_string(), |v| format!("{:.0}", v));
    format!("{}/{}", show(value), show(goal))
}
