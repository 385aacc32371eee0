//! Collaborator record source and the dashboard record types it serves.

pub mod loader;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::fetch::error::FetchError;

pub use loader::{DashboardLoader, DashboardView, LoadOutcome, LoadToken, TeamRoster};

/// Team member record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    /// Stable member identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Contracted hours per week.
    pub weekly_hours: u32,
}

/// Operational team with sprint-completion counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    /// Stable team identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Members on the roster.
    pub total_members: u32,
    /// Members whose schedule for the sprint is complete.
    pub complete_members: u32,
}

/// One member-day schedule cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    /// Member this entry belongs to.
    pub member_id: String,
    /// Working day the entry covers.
    pub date: NaiveDate,
    /// Scheduled hours for the day.
    pub hours: f64,
    /// Optional free-text note.
    pub note: Option<String>,
}

/// Schedule entries keyed by member id, then by ISO 8601 date key.
pub type ScheduleMap = HashMap<String, HashMap<String, ScheduleEntry>>;

/// Aggregated data for the COO dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardData {
    /// Per-team completion counters.
    pub teams: Vec<Team>,
    /// When the aggregate was produced.
    pub generated_at: DateTime<Utc>,
}

/// Upstream record source the dashboard loads from.
///
/// Every method is wrapped by a [`crate::fetch::DataConsistencyManager`]
/// before its results reach application state; implementations only need to
/// surface transport outcomes.
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Members of one team.
    async fn team_members(&self, team_id: &str, force_refresh: bool)
        -> Result<Vec<Member>, FetchError>;

    /// Schedule entries for a team within an inclusive date range.
    async fn schedule_entries(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        team_id: &str,
        force_refresh: bool,
    ) -> Result<ScheduleMap, FetchError>;

    /// All operational teams.
    async fn operational_teams(&self, force_refresh: bool) -> Result<Vec<Team>, FetchError>;

    /// Aggregated COO dashboard data.
    async fn coo_dashboard(&self, force_refresh: bool) -> Result<DashboardData, FetchError>;
}
