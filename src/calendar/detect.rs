//! Sprint detection: resolve which sprint period contains a given date.
//!
//! Detection never fails. Missing or malformed configuration degrades to a
//! deterministic default period and is signalled through the
//! `used_fallback` side channel so the dashboard can always render.

use chrono::{Datelike, Duration, NaiveDate};
use serde::Serialize;

use crate::calendar::arithmetic::{period, working_days, Sprint, SprintPeriod};

/// Result of sprint detection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectedPeriod {
    /// The containing period; always usable.
    pub period: SprintPeriod,
    /// Offset of the period relative to the configured anchor; zero for
    /// fallback periods.
    pub offset: i64,
    /// True when configuration was absent or malformed and the
    /// deterministic default period was used instead.
    pub used_fallback: bool,
}

/// Resolve the sprint period containing `date`.
///
/// With well-formed configuration the minimal offset `k` such that
/// `date ∈ period(config, k)` is found by direct interval arithmetic
/// (euclidean division of the signed day offset by the cycle length), so
/// arbitrarily distant dates resolve in constant time. Otherwise the
/// deterministic fallback of [`fallback_period`] is returned.
#[must_use]
pub fn detect_containing(date: NaiveDate, config: Option<&Sprint>) -> DetectedPeriod {
    match config {
        Some(sprint) if sprint.is_well_formed() => {
            let cycle = i64::from(sprint.length_weeks) * 7;
            let delta = (date - sprint.start_date).num_days();
            let k = delta.div_euclid(cycle);
            let containing = period(sprint, k);
            DetectedPeriod {
                period: containing,
                offset: k,
                used_fallback: false,
            }
        }
        Some(sprint) => {
            tracing::warn!(
                sprint_number = sprint.sprint_number,
                length_weeks = sprint.length_weeks,
                "sprint configuration malformed, using fallback period"
            );
            DetectedPeriod {
                period: fallback_period(date),
                offset: 0,
                used_fallback: true,
            }
        }
        None => {
            tracing::debug!("no sprint configuration, using fallback period");
            DetectedPeriod {
                period: fallback_period(date),
                offset: 0,
                used_fallback: true,
            }
        }
    }
}

/// Deterministic default period: the Sunday on or before `date`, extended
/// to two weeks (10 working days). Pure and reproducible for the same date.
#[must_use]
pub fn fallback_period(date: NaiveDate) -> SprintPeriod {
    let back = i64::from(date.weekday().num_days_from_sunday());
    let start = date - Duration::days(back);
    SprintPeriod {
        start,
        end: start + Duration::days(13),
    }
}

/// Synchronous, I/O-free sprint snapshot for dashboard rendering.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurrentSprintView {
    /// ISO 8601 start date.
    pub start_date: String,
    /// ISO 8601 end date.
    pub end_date: String,
    /// Working days inside the period, ascending.
    pub working_days: Vec<NaiveDate>,
    /// Display name of the detected sprint.
    pub sprint_name: String,
}

/// Detect the sprint containing `date` and expand it into the view the UI
/// consumes. Pure with respect to its inputs; performs no I/O.
#[must_use]
pub fn detect_current_sprint_for_date(
    date: NaiveDate,
    config: Option<&Sprint>,
) -> CurrentSprintView {
    let detected = detect_containing(date, config);
    let sprint_name = if detected.used_fallback {
        "Sprint (estimated)".to_string()
    } else {
        let base = config.map_or(0, |s| i64::from(s.sprint_number));
        format!("Sprint {}", base + detected.offset)
    };
    CurrentSprintView {
        start_date: detected.period.start_iso(),
        end_date: detected.period.end_iso(),
        working_days: working_days(detected.period.start, detected.period.end),
        sprint_name,
    }
}
