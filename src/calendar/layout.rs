//! Display-calendar expansion.
//!
//! Expands a working-day sequence into the cells a calendar grid renders,
//! inserting inert Friday/Saturday "weekend reference" slots between work
//! weeks so the grid stays visually continuous.

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::Serialize;

/// Kind of a display calendar cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CellKind {
    /// Editable working day (Sunday–Thursday).
    WorkingDay,
    /// Non-editable Friday/Saturday slot inserted for layout continuity.
    WeekendReference,
}

/// One cell of the expanded display calendar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CalendarCell {
    /// Calendar date this cell represents.
    pub date: NaiveDate,
    /// Working day or weekend reference.
    pub kind: CellKind,
    /// Short display label, e.g. `"Sun 10/08"`.
    pub label: String,
}

fn label_for(date: NaiveDate) -> String {
    date.format("%a %d/%m").to_string()
}

/// Expand a working-day sequence into display cells.
///
/// Whenever a Sunday starts a new week and the previous cell was a
/// Thursday, the Friday and Saturday between them are inserted as
/// [`CellKind::WeekendReference`] cells carrying their real calendar dates.
/// No padding is added before the first or after the last working day, so
/// sequences that start mid-week or end mid-week stay untouched at the
/// edges. Every input day appears exactly once, in its original order.
#[must_use]
pub fn layout(days: &[NaiveDate]) -> Vec<CalendarCell> {
    let mut cells = Vec::with_capacity(days.len() + days.len() / 5 * 2);
    let mut prev: Option<NaiveDate> = None;
    for &day in days {
        if let Some(before) = prev {
            if before.weekday() == Weekday::Thu && day.weekday() == Weekday::Sun {
                for gap in 1..=2 {
                    let weekend = before + Duration::days(gap);
                    cells.push(CalendarCell {
                        date: weekend,
                        kind: CellKind::WeekendReference,
                        label: label_for(weekend),
                    });
                }
            }
        }
        cells.push(CalendarCell {
            date: day,
            kind: CellKind::WorkingDay,
            label: label_for(day),
        });
        prev = Some(day);
    }
    cells
}
