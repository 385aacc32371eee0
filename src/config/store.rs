//! Process-wide owner of the current sprint configuration.

use chrono::NaiveDate;
use parking_lot::RwLock;

use crate::calendar::arithmetic::Sprint;

/// Versioned snapshot of the current sprint configuration.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SprintSnapshot {
    /// Monotonically increasing version, bumped on every replacement.
    pub version: u64,
    /// The current sprint, if one has been started.
    pub sprint: Option<Sprint>,
}

/// Owns the single "current sprint" record.
///
/// The record is replaced wholesale by the administrative start-new-sprint
/// action and is otherwise immutable; readers receive versioned snapshots
/// rather than reading ambient global state.
#[derive(Debug, Default)]
pub struct SprintStore {
    inner: RwLock<SprintSnapshot>,
}

impl SprintStore {
    /// Create an empty store with no current sprint.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the current sprint and its version.
    #[must_use]
    pub fn current(&self) -> SprintSnapshot {
        self.inner.read().clone()
    }

    /// Administrative action: start a new sprint, replacing the current
    /// record atomically and bumping the version. The sprint number
    /// continues the previous sequence.
    ///
    /// # Errors
    ///
    /// A description of the invalid argument when `length_weeks` is outside
    /// 1–4.
    pub fn start_new_sprint(
        &self,
        start_date: NaiveDate,
        length_weeks: u8,
        today: NaiveDate,
    ) -> Result<Sprint, String> {
        if !(1..=4).contains(&length_weeks) {
            return Err(format!(
                "length_weeks must be between 1 and 4, got {length_weeks}"
            ));
        }
        let mut inner = self.inner.write();
        let number = inner
            .sprint
            .as_ref()
            .map_or(1, |s| s.sprint_number.saturating_add(1));
        let mut sprint = Sprint::new(number, start_date, length_weeks);
        sprint.refresh_progress(today);
        inner.sprint = Some(sprint.clone());
        inner.version += 1;
        tracing::info!(
            sprint_number = sprint.sprint_number,
            start = %sprint.start_date,
            end = %sprint.end_date,
            version = inner.version,
            "started new sprint"
        );
        Ok(sprint)
    }
}
