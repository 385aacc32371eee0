//! Pure sprint-period and working-day arithmetic.
//!
//! Every function here is a pure function of its inputs. Period offsets
//! shift the anchor sprint's own bounds, never "today", so repeated
//! forward/backward navigation is associative and cannot cycle across a
//! month boundary. All arithmetic is done on [`NaiveDate`] calendar dates;
//! no timestamps, no timezones.

use chrono::{Datelike, Duration, Months, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

/// Canonical sprint configuration record.
///
/// Exactly one sprint is "current" at any moment; it is created or replaced
/// wholesale by the administrative start-new-sprint action (see
/// [`crate::config::SprintStore`]) and otherwise immutable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sprint {
    /// Monotonically increasing sprint number.
    pub sprint_number: u32,
    /// First day of the sprint, inclusive.
    pub start_date: NaiveDate,
    /// Last day of the sprint, inclusive.
    pub end_date: NaiveDate,
    /// Sprint length in weeks (1–4).
    pub length_weeks: u8,
    /// Share of working days already elapsed, 0.0–100.0.
    pub progress_percentage: f64,
    /// Working days left after "today" as of the last refresh.
    pub days_remaining: usize,
}

impl Sprint {
    /// Build a sprint starting at `start_date`, deriving the end date from
    /// the length invariant `end == start + length_weeks*7 - 1`.
    #[must_use]
    pub fn new(sprint_number: u32, start_date: NaiveDate, length_weeks: u8) -> Self {
        let end_date = start_date + Duration::days(i64::from(length_weeks) * 7 - 1);
        Self {
            sprint_number,
            start_date,
            end_date,
            length_weeks,
            progress_percentage: 0.0,
            days_remaining: 0,
        }
    }

    /// True when the record satisfies the structural invariants the
    /// calendar arithmetic relies on: length within 1–4 weeks and an end
    /// date matching `start + length_weeks*7 - 1`.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        (1..=4).contains(&self.length_weeks)
            && self.end_date >= self.start_date
            && self.end_date
                == self.start_date + Duration::days(i64::from(self.length_weeks) * 7 - 1)
    }

    /// Recompute `progress_percentage` and `days_remaining` as of `today`.
    pub fn refresh_progress(&mut self, today: NaiveDate) {
        let total = working_day_count(self.start_date, self.end_date);
        let elapsed = if today < self.start_date {
            0
        } else {
            working_day_count(self.start_date, today.min(self.end_date))
        };
        self.progress_percentage = if total == 0 {
            0.0
        } else {
            elapsed as f64 * 100.0 / total as f64
        };
        self.days_remaining = if today >= self.end_date {
            0
        } else {
            let from = today
                .succ_opt()
                .unwrap_or(today)
                .max(self.start_date);
            working_day_count(from, self.end_date)
        };
    }
}

/// Derived `{start, end}` view of a sprint shifted by an integer offset.
/// Stateless; recomputed on every navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SprintPeriod {
    /// First day, inclusive.
    pub start: NaiveDate,
    /// Last day, inclusive.
    pub end: NaiveDate,
}

impl SprintPeriod {
    /// ISO 8601 (`YYYY-MM-DD`) start date.
    #[must_use]
    pub fn start_iso(&self) -> String {
        self.start.format("%Y-%m-%d").to_string()
    }

    /// ISO 8601 (`YYYY-MM-DD`) end date.
    #[must_use]
    pub fn end_iso(&self) -> String {
        self.end.format("%Y-%m-%d").to_string()
    }

    /// Re-anchor this period as a sprint record so navigation can continue
    /// relative to it.
    #[must_use]
    pub fn as_anchor(&self, sprint_number: u32, length_weeks: u8) -> Sprint {
        Sprint {
            sprint_number,
            start_date: self.start,
            end_date: self.end,
            length_weeks,
            progress_percentage: 0.0,
            days_remaining: 0,
        }
    }
}

/// Shift the anchor sprint's own bounds by `offset * length_weeks * 7` days.
///
/// `period(anchor, 0)` returns the anchor's bounds unchanged. The offset is
/// applied to the anchor, never re-derived from the current date, so
/// stepping forward from the last day of one period can never land before
/// the period that was just left.
#[must_use]
pub fn period(anchor: &Sprint, offset: i64) -> SprintPeriod {
    let shift = Duration::days(offset * i64::from(anchor.length_weeks) * 7);
    SprintPeriod {
        start: anchor.start_date + shift,
        end: anchor.end_date + shift,
    }
}

/// Sunday through Thursday is the business week; Friday and Saturday are
/// weekend.
#[must_use]
pub fn is_working_day(day: NaiveDate) -> bool {
    !matches!(day.weekday(), Weekday::Fri | Weekday::Sat)
}

/// Enumerate every working day from `start` to `end` inclusive, ascending.
/// Empty when `end < start`.
#[must_use]
pub fn working_days(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let mut days = Vec::new();
    let mut day = start;
    while day <= end {
        if is_working_day(day) {
            days.push(day);
        }
        match day.succ_opt() {
            Some(next) => day = next,
            None => break,
        }
    }
    days
}

/// Number of working days from `start` to `end` inclusive; zero for
/// degenerate ranges (`end < start`).
#[must_use]
pub fn working_day_count(start: NaiveDate, end: NaiveDate) -> usize {
    working_days(start, end).len()
}

/// Human label for a sprint offset relative to the current one.
#[must_use]
pub fn sprint_description(offset: i64) -> String {
    match offset {
        0 => "Current Sprint".to_string(),
        1 => "Next Sprint".to_string(),
        -1 => "Previous Sprint".to_string(),
        n if n > 1 => format!("Sprint +{n}"),
        n => format!("Sprint {n}"),
    }
}

/// Human-readable date range, e.g. `"Aug 10 – Aug 23, 2025"`.
#[must_use]
pub fn format_date_range(period: SprintPeriod) -> String {
    if period.start.year() == period.end.year() {
        format!(
            "{} – {}, {}",
            period.start.format("%b %-d"),
            period.end.format("%b %-d"),
            period.end.year()
        )
    } else {
        format!(
            "{} – {}",
            period.start.format("%b %-d, %Y"),
            period.end.format("%b %-d, %Y")
        )
    }
}

/// Earliest date reachable by calendar navigation.
#[must_use]
pub fn min_navigation_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2020, 1, 1).unwrap_or(NaiveDate::MIN)
}

/// Latest date reachable by calendar navigation: fifty years past `today`.
#[must_use]
pub fn max_navigation_date(today: NaiveDate) -> NaiveDate {
    today + Months::new(600)
}

/// Clamp a navigation target into `[min_navigation_date, max_navigation_date]`.
#[must_use]
pub fn clamp_navigation(date: NaiveDate, today: NaiveDate) -> NaiveDate {
    date.clamp(min_navigation_date(), max_navigation_date(today))
}

/// Step forward by `weeks` whole weeks, clamped to the navigation bounds.
/// The result is never earlier than `from`.
#[must_use]
pub fn navigate_forward(from: NaiveDate, weeks: u8, today: NaiveDate) -> NaiveDate {
    let stepped = from + Duration::days(i64::from(weeks) * 7);
    clamp_navigation(stepped, today).max(from)
}

/// Step backward by `weeks` whole weeks, clamped to the navigation bounds.
/// The result is never later than `from`.
#[must_use]
pub fn navigate_backward(from: NaiveDate, weeks: u8, today: NaiveDate) -> NaiveDate {
    let stepped = from - Duration::days(i64::from(weeks) * 7);
    clamp_navigation(stepped, today).min(from)
}
