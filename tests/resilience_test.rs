//! Integration tests for the resilient fetch pipeline and dashboard loader.
//!
//! These validate the failure semantics the dashboard depends on:
//! 1. Concurrent identical fetches collapse to one underlying call
//! 2. The breaker opens, rejects fast, probes, and recovers
//! 3. Invalid batches never overwrite previously displayed valid state
//! 4. Superseded and cancelled loads resolve without mutating state

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::Mutex;
use tokio::sync::Notify;

use sprintgrid::calendar::SprintPeriod;
use sprintgrid::config::EngineSettings;
use sprintgrid::fetch::{
    BreakerConfig, BreakerState, DataConsistencyManager, FetchError, RequestCache,
    ValidationRule,
};
use sprintgrid::source::{
    DashboardData, DashboardLoader, LoadOutcome, Member, RecordSource, ScheduleMap, Team,
};
use sprintgrid::util::clock::ManualClock;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn sprint_period() -> SprintPeriod {
    SprintPeriod {
        start: date(2025, 8, 10),
        end: date(2025, 8, 23),
    }
}

fn team(id: &str, total: u32, complete: u32) -> Team {
    Team {
        id: id.to_string(),
        name: format!("Team {id}"),
        total_members: total,
        complete_members: complete,
    }
}

fn member(id: &str) -> Member {
    Member {
        id: id.to_string(),
        name: format!("Member {id}"),
        weekly_hours: 40,
    }
}

/// Scripted record source: pops one scripted team response per call (the
/// last one repeats), serves a fixed member list, and can gate the team
/// query behind a notify for interleaving tests.
struct ScriptedSource {
    team_responses: Mutex<VecDeque<Result<Vec<Team>, FetchError>>>,
    members: Vec<Member>,
    team_calls: AtomicUsize,
    gate: Option<Arc<Notify>>,
}

impl ScriptedSource {
    fn new(team_responses: Vec<Result<Vec<Team>, FetchError>>) -> Self {
        Self {
            team_responses: Mutex::new(team_responses.into()),
            members: vec![member("m1"), member("m2")],
            team_calls: AtomicUsize::new(0),
            gate: None,
        }
    }

    fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }
}

#[async_trait]
impl RecordSource for ScriptedSource {
    async fn team_members(
        &self,
        _team_id: &str,
        _force_refresh: bool,
    ) -> Result<Vec<Member>, FetchError> {
        Ok(self.members.clone())
    }

    async fn schedule_entries(
        &self,
        _start: NaiveDate,
        _end: NaiveDate,
        _team_id: &str,
        _force_refresh: bool,
    ) -> Result<ScheduleMap, FetchError> {
        Ok(ScheduleMap::new())
    }

    async fn operational_teams(&self, _force_refresh: bool) -> Result<Vec<Team>, FetchError> {
        self.team_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        let mut responses = self.team_responses.lock();
        if responses.len() > 1 {
            responses.pop_front().unwrap_or(Ok(Vec::new()))
        } else {
            responses.front().cloned().unwrap_or(Ok(Vec::new()))
        }
    }

    async fn coo_dashboard(&self, _force_refresh: bool) -> Result<DashboardData, FetchError> {
        Ok(DashboardData {
            teams: vec![team("t1", 5, 3)],
            generated_at: chrono::Utc::now(),
        })
    }
}

fn settings() -> EngineSettings {
    EngineSettings::default()
}

// ============================================================================
// Request de-duplication
// ============================================================================

#[tokio::test]
async fn test_concurrent_identical_fetches_invoke_fetch_fn_once() {
    let cache: RequestCache<u32> = RequestCache::new();
    let gate = Arc::new(Notify::new());
    let calls = Arc::new(AtomicUsize::new(0));
    let ttl = Duration::from_secs(60);

    let first = {
        let gate = Arc::clone(&gate);
        let calls = Arc::clone(&calls);
        cache.get_or_fetch(
            "teams",
            ttl,
            move || async move {
                gate.notified().await;
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(7)
            },
            false,
        )
    };
    let second = {
        let calls = Arc::clone(&calls);
        cache.get_or_fetch(
            "teams",
            ttl,
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(9)
            },
            false,
        )
    };
    let release = async {
        tokio::task::yield_now().await;
        gate.notify_one();
    };

    let (r1, r2, ()) = tokio::join!(first, second, release);
    assert_eq!(r1.unwrap(), 7);
    assert_eq!(r2.unwrap(), 7, "second caller must share the pending result");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(cache.stats().misses, 2);
}

// ============================================================================
// Circuit breaker through the consistency manager
// ============================================================================

#[tokio::test]
async fn test_breaker_opens_probes_and_recovers() {
    let clock = Arc::new(ManualClock::new());
    let config = BreakerConfig {
        failure_threshold: 3,
        window: Duration::from_secs(60),
        cooldown: Duration::from_secs(30),
        max_cooldown: Duration::from_secs(120),
        call_timeout: Duration::from_secs(5),
    };
    let manager: DataConsistencyManager<Team> =
        DataConsistencyManager::with_clock("teams", config, clock.clone());
    let rules = Vec::new();
    let ttl = Duration::from_secs(60);

    for _ in 0..3 {
        let err = manager
            .fetch_validated(
                "teams",
                ttl,
                || async { Err(FetchError::Transport("backend down".into())) },
                &rules,
                false,
            )
            .await
            .unwrap_err();
        assert_eq!(err, FetchError::Transport("backend down".into()));
    }
    assert_eq!(manager.breaker_state(), BreakerState::Open);

    // Open: rejected without invoking the wrapped call.
    let calls = AtomicUsize::new(0);
    let err = manager
        .fetch_validated(
            "teams",
            ttl,
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(vec![team("t1", 5, 3)]) }
            },
            &rules,
            false,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::BreakerOpen { .. }));
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    // After the cooldown the probe is admitted and success closes.
    clock.advance(Duration::from_secs(30));
    let batch = manager
        .fetch_validated(
            "teams",
            ttl,
            || async { Ok(vec![team("t1", 5, 3)]) },
            &rules,
            false,
        )
        .await
        .unwrap();
    assert!(batch.is_valid);
    assert_eq!(manager.breaker_state(), BreakerState::Closed);
}

// ============================================================================
// Validation protecting displayed state
// ============================================================================

#[tokio::test]
async fn test_invalid_batch_leaves_previous_view_untouched() {
    let source = Arc::new(ScriptedSource::new(vec![
        Ok(vec![team("t1", 5, 3), team("t2", 4, 4)]),
        // completeMembers > totalMembers: must be rejected wholesale.
        Ok(vec![team("t1", 5, 9)]),
    ]));
    let loader = DashboardLoader::new(Arc::clone(&source), &settings());

    let first = loader.load(sprint_period(), false).await.unwrap();
    assert_eq!(first, LoadOutcome::Applied);
    let before = loader.view();
    assert_eq!(before.rosters.len(), 2);
    assert!(before.errors.is_empty());
    assert_eq!(before.rosters[0].members.len(), 2);

    let second = loader.load(sprint_period(), true).await.unwrap();
    assert_eq!(second, LoadOutcome::Rejected);
    let after = loader.view();
    assert_eq!(after.rosters, before.rosters, "valid state must be preserved");
    assert!(!after.errors.is_empty());
    assert!(after.errors[0].contains("complete_members_within_total"));
}

#[tokio::test]
async fn test_validation_rule_conjunction() {
    let manager: DataConsistencyManager<Team> =
        DataConsistencyManager::new("teams", BreakerConfig::default());
    let rules = vec![
        ValidationRule::new("id_present", |t: &Team| !t.id.is_empty()),
        ValidationRule::new("counters", |t: &Team| t.complete_members <= t.total_members),
    ];
    let batch = manager
        .fetch_validated(
            "teams",
            Duration::from_secs(60),
            || async { Ok(vec![team("", 2, 5)]) },
            &rules,
            false,
        )
        .await
        .unwrap();
    assert!(!batch.is_valid);
    assert!(batch.records.is_empty());
    // Both rules report the same record.
    assert_eq!(batch.errors.len(), 2);
}

// ============================================================================
// Supersede and cancellation
// ============================================================================

#[tokio::test]
async fn test_superseded_load_never_overwrites_newer_state() {
    let gate = Arc::new(Notify::new());
    let source = Arc::new(
        ScriptedSource::new(vec![Ok(vec![team("t1", 5, 3)])]).gated(Arc::clone(&gate)),
    );
    let loader = DashboardLoader::new(Arc::clone(&source), &settings());

    let first = loader.load(sprint_period(), false);
    let second = loader.load(sprint_period(), false);
    let release = async {
        // Let both loads start (and the second join the pending fetch)
        // before the gate opens.
        tokio::task::yield_now().await;
        gate.notify_one();
    };
    let (r1, r2, ()) = tokio::join!(first, second, release);

    assert_eq!(r1.unwrap(), LoadOutcome::Superseded);
    assert_eq!(r2.unwrap(), LoadOutcome::Applied);
    assert_eq!(loader.view().rosters.len(), 1);
    // De-duplication also held: both loads shared one team fetch.
    assert_eq!(source.team_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_cancelled_load_mutates_nothing() {
    let gate = Arc::new(Notify::new());
    let source = Arc::new(
        ScriptedSource::new(vec![Ok(vec![team("t1", 5, 3)])]).gated(Arc::clone(&gate)),
    );
    let loader = DashboardLoader::new(Arc::clone(&source), &settings());

    let load = loader.load(sprint_period(), false);
    let cancel = async {
        tokio::task::yield_now().await;
        loader.cancel();
        gate.notify_one();
    };
    let (outcome, ()) = tokio::join!(load, cancel);

    assert_eq!(outcome.unwrap(), LoadOutcome::Superseded);
    let view = loader.view();
    assert!(view.rosters.is_empty());
    assert!(view.errors.is_empty());
}

// ============================================================================
// Whole-view timeout and operational surface
// ============================================================================

#[tokio::test]
async fn test_view_timeout_bounds_a_stuck_load() {
    let gate = Arc::new(Notify::new());
    let source = Arc::new(
        ScriptedSource::new(vec![Ok(vec![team("t1", 5, 3)])]).gated(Arc::clone(&gate)),
    );
    let mut settings = settings();
    settings.view_timeout_secs = 1;
    let loader = DashboardLoader::new(Arc::clone(&source), &settings);

    // The gate never opens; the coarse timeout must fire.
    let err = loader.load(sprint_period(), false).await.unwrap_err();
    assert_eq!(err, FetchError::Timeout(Duration::from_secs(1)));
    assert!(loader.view().rosters.is_empty());
}

#[tokio::test]
async fn test_loader_stats_and_clear() {
    let source = Arc::new(ScriptedSource::new(vec![Ok(vec![team("t1", 5, 3)])]));
    let loader = DashboardLoader::new(Arc::clone(&source), &settings());
    loader.load(sprint_period(), false).await.unwrap();

    let stats = loader.stats();
    let teams_stats = stats.iter().find(|(name, _)| *name == "teams").unwrap().1;
    assert_eq!(teams_stats.entries, 1);
    assert_eq!(teams_stats.misses, 1);

    loader.clear_caches();
    let stats = loader.stats();
    assert!(stats.iter().all(|(_, s)| s.entries == 0));
}

#[tokio::test]
async fn test_coo_dashboard_batch_is_validated() {
    let source = Arc::new(ScriptedSource::new(vec![Ok(Vec::new())]));
    let loader = DashboardLoader::new(Arc::clone(&source), &settings());
    let batch = loader.coo_dashboard(false).await.unwrap();
    assert!(batch.is_valid);
    assert_eq!(batch.records.len(), 1);
    assert_eq!(batch.records[0].teams[0].id, "t1");
}
