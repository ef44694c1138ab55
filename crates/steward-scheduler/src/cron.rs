//! Cron expressions.
//! Accepts Quartz-style 6/7-field (`SEC MIN HOUR DOM MON DOW [YEAR]`, `?`
//! allowed) and classic 5-field (`MIN HOUR DOM MON DOW`, seconds assumed 0).
//! Classic day-of-week numbers run 0-6 from Sunday (7 is Sunday too); the
//! `cron` crate counts 1-7 from Sunday, so 5-field input is shifted.
//! Example: "0 30 7 * * ?" = every day at 07:30:00.

use std::str::FromStr;

use chrono::{DateTime, Local};
use cron::Schedule;

use steward_core::error::{Result, StewardError};

/// Rewrite an expression into the 6/7-field form the `cron` crate parses.
pub fn normalize(expression: &str) -> Result<String> {
    let mut fields: Vec<String> = expression.split_whitespace().map(String::from).collect();
    match fields.len() {
        5 => {
            let day_of_week = classic_day_of_week(&fields[4]).ok_or_else(|| {
                StewardError::Config(format!(
                    "invalid cron expression '{expression}': bad day-of-week '{}'",
                    fields[4]
                ))
            })?;
            fields[4] = day_of_week;
            fields.insert(0, "0".into());
        }
        6 | 7 => {}
        n => {
            return Err(StewardError::Config(format!(
                "invalid cron expression '{expression}': expected 5, 6 or 7 fields, got {n}"
            )));
        }
    }
    let fields: Vec<String> = fields
        .into_iter()
        .map(|f| if f == "?" { "*".into() } else { f })
        .collect();
    Ok(fields.join(" "))
}

/// Shift a classic day-of-week field (0-7, Sunday = 0 or 7) to 1-7 from Sunday.
/// Names, `*` and `?` pass through. `None` on an out-of-range number.
fn classic_day_of_week(field: &str) -> Option<String> {
    let parts = field
        .split(',')
        .map(|part| {
            let (base, step) = match part.split_once('/') {
                Some((base, step)) => (base, Some(step)),
                None => (part, None),
            };
            let base = match base.split_once('-') {
                Some((from, to)) => {
                    let from = shift_day(from)?;
                    // A range ending on classic 7 runs to Saturday and wraps to Sunday.
                    if to.trim() == "7" && from != "1" {
                        if step.is_some() {
                            return None;
                        }
                        return Some(format!("{from}-7,1"));
                    }
                    let to = if to.trim() == "7" { "7".to_string() } else { shift_day(to)? };
                    format!("{from}-{to}")
                }
                None => shift_day(base)?,
            };
            Some(match step {
                Some(step) => format!("{base}/{step}"),
                None => base,
            })
        })
        .collect::<Option<Vec<String>>>()?;
    Some(parts.join(","))
}

fn shift_day(day: &str) -> Option<String> {
    let day = day.trim();
    if day.is_empty() || !day.bytes().all(|b| b.is_ascii_digit()) {
        return Some(day.to_string());
    }
    match day.parse::<u8>().ok()? {
        0 | 7 => Some("1".into()),
        n @ 1..=6 => Some((n + 1).to_string()),
        _ => None,
    }
}

/// Parse an expression into a schedule.
pub fn parse(expression: &str) -> Result<Schedule> {
    let normalized = normalize(expression)?;
    Schedule::from_str(&normalized)
        .map_err(|e| StewardError::Config(format!("invalid cron expression '{expression}': {e}")))
}

/// First fire time strictly after `after`.
pub fn next_fire(schedule: &Schedule, after: DateTime<Local>) -> Option<DateTime<Local>> {
    schedule.after(&after).next()
}

/// Parse and compute the next fire time in one go.
pub fn next_run_from_cron(expression: &str, after: DateTime<Local>) -> Option<DateTime<Local>> {
    match parse(expression) {
        Ok(schedule) => next_fire(&schedule, after),
        Err(e) => {
            tracing::warn!("{e}");
            None
        }
    }
}
