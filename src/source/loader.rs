//! Dashboard loader: fan-out entity loads with supersede/cancel semantics.
//!
//! Loads the operational teams, then fans out per-team member and schedule
//! loads, all through per-dependency consistency managers. Each load is
//! bound to a generation token; a stale load's result is discarded rather
//! than overwriting state written by a newer load, and the "still current"
//! check happens immediately before every state mutation, not merely at
//! call start.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::{join, join_all};
use parking_lot::Mutex;
use uuid::Uuid;

use crate::calendar::arithmetic::SprintPeriod;
use crate::config::settings::EngineSettings;
use crate::fetch::cache::CacheStats;
use crate::fetch::consistency::{DataConsistencyManager, ValidatedBatch, ValidationRule};
use crate::fetch::error::FetchError;
use crate::source::{DashboardData, Member, RecordSource, ScheduleEntry, ScheduleMap, Team};

/// Generation token guarding a loadable view against stale writes.
///
/// Each load snapshots the generation at start and re-checks it before
/// every state mutation; bumping the generation (a newer load) or
/// cancelling supersedes all outstanding loads.
#[derive(Debug, Default)]
pub struct LoadToken {
    generation: AtomicU64,
    cancelled: AtomicBool,
}

impl LoadToken {
    /// Create a token with no loads outstanding.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new load, superseding every previous one. Clears a pending
    /// cancellation.
    pub fn begin(&self) -> u64 {
        self.cancelled.store(false, Ordering::SeqCst);
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Cancel every outstanding load. Cancelled loads resolve silently
    /// without mutating state.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// True when `snapshot` is still the newest load and no cancellation is
    /// pending.
    #[must_use]
    pub fn is_current(&self, snapshot: u64) -> bool {
        !self.cancelled.load(Ordering::SeqCst)
            && self.generation.load(Ordering::SeqCst) == snapshot
    }
}

/// One team joined with its members and schedule for the loaded period.
#[derive(Debug, Clone, PartialEq)]
pub struct TeamRoster {
    /// The team record.
    pub team: Team,
    /// Validated members; empty when the member batch was rejected.
    pub members: Vec<Member>,
    /// Validated schedule entries; empty when the batch was rejected.
    pub schedule: Vec<ScheduleEntry>,
}

/// Materialized dashboard view for one sprint period.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DashboardView {
    /// Per-team rosters in team order.
    pub rosters: Vec<TeamRoster>,
    /// Structured "unable to load, retry" messages for the UI.
    pub errors: Vec<String>,
}

/// Outcome of a load attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The view was refreshed (possibly with partial per-team errors).
    Applied,
    /// Validation rejected the team batch; previous view data was
    /// preserved and only the error signal was surfaced.
    Rejected,
    /// A newer load superseded this one, or it was cancelled; nothing was
    /// written.
    Superseded,
}

/// Default invariants for team batches.
#[must_use]
pub fn default_team_rules() -> Vec<ValidationRule<Team>> {
    vec![
        ValidationRule::new("team_id_present", |t: &Team| !t.id.is_empty()),
        ValidationRule::new("complete_members_within_total", |t: &Team| {
            t.complete_members <= t.total_members
        }),
    ]
}

/// Default invariants for member batches.
#[must_use]
pub fn default_member_rules() -> Vec<ValidationRule<Member>> {
    vec![
        ValidationRule::new("member_id_present", |m: &Member| !m.id.is_empty()),
        ValidationRule::new("weekly_hours_sane", |m: &Member| m.weekly_hours <= 80),
    ]
}

/// Default invariants for schedule batches.
#[must_use]
pub fn default_schedule_rules() -> Vec<ValidationRule<ScheduleEntry>> {
    vec![
        ValidationRule::new("member_id_present", |e: &ScheduleEntry| {
            !e.member_id.is_empty()
        }),
        ValidationRule::new("hours_within_day", |e: &ScheduleEntry| {
            (0.0..=24.0).contains(&e.hours)
        }),
    ]
}

/// Default invariants for the COO aggregate.
#[must_use]
pub fn default_dashboard_rules() -> Vec<ValidationRule<DashboardData>> {
    vec![ValidationRule::new(
        "team_counters_coherent",
        |d: &DashboardData| {
            d.teams
                .iter()
                .all(|t| t.complete_members <= t.total_members)
        },
    )]
}

fn flatten_schedule(map: ScheduleMap) -> Vec<ScheduleEntry> {
    map.into_values()
        .flat_map(HashMap::into_values)
        .collect()
}

/// Loads and owns the dashboard view for the current sprint period.
///
/// Each query type gets its own consistency manager (and therefore its own
/// circuit breaker), so one slow query type cannot starve the others.
pub struct DashboardLoader<S: RecordSource> {
    source: Arc<S>,
    teams: DataConsistencyManager<Team>,
    members: DataConsistencyManager<Member>,
    schedule: DataConsistencyManager<ScheduleEntry>,
    coo: DataConsistencyManager<DashboardData>,
    token: LoadToken,
    view: Mutex<DashboardView>,
    ttl: Duration,
    view_timeout: Duration,
}

impl<S: RecordSource> DashboardLoader<S> {
    /// Create a loader over a record source with the given settings.
    #[must_use]
    pub fn new(source: Arc<S>, settings: &EngineSettings) -> Self {
        let breaker = settings.breaker_config();
        Self {
            source,
            teams: DataConsistencyManager::new("teams", breaker.clone()),
            members: DataConsistencyManager::new("members", breaker.clone()),
            schedule: DataConsistencyManager::new("schedule", breaker.clone()),
            coo: DataConsistencyManager::new("coo_dashboard", breaker),
            token: LoadToken::new(),
            view: Mutex::new(DashboardView::default()),
            ttl: settings.default_ttl(),
            view_timeout: settings.view_timeout(),
        }
    }

    /// Snapshot of the currently displayed view.
    #[must_use]
    pub fn view(&self) -> DashboardView {
        self.view.lock().clone()
    }

    /// Cancel every outstanding load (component teardown, navigation away).
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Load the dashboard for `period`, superseding any in-flight load.
    ///
    /// Sub-loads are issued fan-out/fan-in; the whole load is bounded by
    /// the coarse view timeout so one slow sub-request cannot block the
    /// view indefinitely.
    ///
    /// # Errors
    ///
    /// Transport-level failure of the team query, or
    /// [`FetchError::Timeout`] when the view timeout elapsed. Per-team
    /// failures are absorbed into the view's error list instead.
    pub async fn load(
        &self,
        period: SprintPeriod,
        force_refresh: bool,
    ) -> Result<LoadOutcome, FetchError> {
        let snapshot = self.token.begin();
        let request_id = Uuid::new_v4();
        tracing::debug!(
            %request_id,
            start = %period.start,
            end = %period.end,
            force_refresh,
            "dashboard load started"
        );
        match tokio::time::timeout(
            self.view_timeout,
            self.load_inner(period, force_refresh, snapshot),
        )
        .await
        {
            Ok(result) => {
                tracing::debug!(%request_id, outcome = ?result.as_ref().ok(), "dashboard load finished");
                result
            }
            Err(_) => {
                tracing::warn!(%request_id, "dashboard load exceeded view timeout");
                Err(FetchError::Timeout(self.view_timeout))
            }
        }
    }

    async fn load_inner(
        &self,
        period: SprintPeriod,
        force_refresh: bool,
        snapshot: u64,
    ) -> Result<LoadOutcome, FetchError> {
        let teams_source = Arc::clone(&self.source);
        let teams = self
            .teams
            .fetch_validated(
                "teams",
                self.ttl,
                || async move { teams_source.operational_teams(force_refresh).await },
                &default_team_rules(),
                force_refresh,
            )
            .await?;
        if !self.token.is_current(snapshot) {
            return Ok(LoadOutcome::Superseded);
        }
        if !teams.is_valid {
            self.view.lock().errors = teams.errors;
            return Ok(LoadOutcome::Rejected);
        }

        let member_rules = default_member_rules();
        let schedule_rules = default_schedule_rules();
        let loads = teams.records.iter().map(|team| {
            let team_id = team.id.clone();
            let member_key = format!("members:{team_id}");
            let schedule_key = format!(
                "schedule:{team_id}:{}:{}",
                period.start_iso(),
                period.end_iso()
            );
            let member_rules = &member_rules;
            let schedule_rules = &schedule_rules;
            async move {
                let member_source = Arc::clone(&self.source);
                let member_team = team_id.clone();
                let members_fut = self.members.fetch_validated(
                    &member_key,
                    self.ttl,
                    || async move {
                        member_source
                            .team_members(&member_team, force_refresh)
                            .await
                    },
                    member_rules,
                    force_refresh,
                );
                let schedule_source = Arc::clone(&self.source);
                let schedule_team = team_id.clone();
                let schedule_fut = self.schedule.fetch_validated(
                    &schedule_key,
                    self.ttl,
                    || async move {
                        schedule_source
                            .schedule_entries(
                                period.start,
                                period.end,
                                &schedule_team,
                                force_refresh,
                            )
                            .await
                            .map(flatten_schedule)
                    },
                    schedule_rules,
                    force_refresh,
                );
                let (members, schedule) = join(members_fut, schedule_fut).await;
                (team_id, members, schedule)
            }
        });
        let results = join_all(loads).await;
        if !self.token.is_current(snapshot) {
            return Ok(LoadOutcome::Superseded);
        }

        let mut rosters = Vec::with_capacity(teams.records.len());
        let mut errors = Vec::new();
        for (team, (team_id, members, schedule)) in teams.records.into_iter().zip(results) {
            let mut roster = TeamRoster {
                team,
                members: Vec::new(),
                schedule: Vec::new(),
            };
            match members {
                Ok(batch) if batch.is_valid => roster.members = batch.records,
                Ok(batch) => errors.extend(
                    batch
                        .errors
                        .into_iter()
                        .map(|e| format!("team {team_id} members: {e}")),
                ),
                Err(FetchError::Cancelled) => return Ok(LoadOutcome::Superseded),
                Err(err) => errors.push(format!("team {team_id} members: {err}")),
            }
            match schedule {
                Ok(batch) if batch.is_valid => roster.schedule = batch.records,
                Ok(batch) => errors.extend(
                    batch
                        .errors
                        .into_iter()
                        .map(|e| format!("team {team_id} schedule: {e}")),
                ),
                Err(FetchError::Cancelled) => return Ok(LoadOutcome::Superseded),
                Err(err) => errors.push(format!("team {team_id} schedule: {err}")),
            }
            rosters.push(roster);
        }

        if !self.token.is_current(snapshot) {
            return Ok(LoadOutcome::Superseded);
        }
        *self.view.lock() = DashboardView { rosters, errors };
        Ok(LoadOutcome::Applied)
    }

    /// Fetch and validate the COO aggregate through its own manager.
    ///
    /// # Errors
    ///
    /// Transport-level failures of the underlying query.
    pub async fn coo_dashboard(
        &self,
        force_refresh: bool,
    ) -> Result<ValidatedBatch<DashboardData>, FetchError> {
        let source = Arc::clone(&self.source);
        self.coo
            .fetch_validated(
                "coo_dashboard",
                self.ttl,
                || async move { source.coo_dashboard(force_refresh).await.map(|d| vec![d]) },
                &default_dashboard_rules(),
                force_refresh,
            )
            .await
    }

    /// Evict every cached batch across all query types.
    pub fn clear_caches(&self) {
        self.teams.clear_all();
        self.members.clear_all();
        self.schedule.clear_all();
        self.coo.clear_all();
    }

    /// Per-query-type cache statistics for operational visibility.
    #[must_use]
    pub fn stats(&self) -> Vec<(&'static str, CacheStats)> {
        vec![
            ("teams", self.teams.stats()),
            ("members", self.members.stats()),
            ("schedule", self.schedule.stats()),
            ("coo_dashboard", self.coo.stats()),
        ]
    }
}
