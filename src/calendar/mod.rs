//! Sprint calendar engine: pure period arithmetic, containing-period
//! detection, and display-calendar layout.

pub mod arithmetic;
pub mod detect;
pub mod layout;

pub use arithmetic::{
    clamp_navigation, format_date_range, is_working_day, max_navigation_date,
    min_navigation_date, navigate_backward, navigate_forward, period, sprint_description,
    working_day_count, working_days, Sprint, SprintPeriod,
};
pub use detect::{
    detect_containing, detect_current_sprint_for_date, fallback_period, CurrentSprintView,
    DetectedPeriod,
};
pub use layout::{layout, CalendarCell, CellKind};
