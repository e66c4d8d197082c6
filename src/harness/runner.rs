//! Scenario execution
//!
//! Each scenario inserts one fresh record and watches the worker act on it:
//!
//! - immediate and broadcast: insert, then poll until processed
//! - scheduled: insert, read once and require "pending", sleep past
//!   `deliver_at`, then poll until processed
//!
//! A positive result is confirmed with one more read, which must still see
//! the record processed. Store errors abort the run; assertion failures only
//! fail their own scenario.

use std::time::Duration;

use chrono::Utc;
use futures_util::future::join_all;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::poll::{poll_until, processed, snapshot};
use super::report::{Failure, Outcome, ScenarioResult};
use super::scenario::{Scenario, ScenarioKind};
use crate::common::{millis, Error, Result};
use crate::store::NotificationStore;

/// Where a scenario is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Injected,
    EarlyChecked,
    Awaiting,
    Resolved,
}

/// How a set of scenarios is executed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    /// Run scenarios as overlapping futures
    pub concurrent: bool,
    /// Slack on top of the summed scenario budgets
    pub grace: Duration,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            concurrent: false,
            grace: Duration::from_secs(5),
        }
    }
}

impl RunOptions {
    /// Deadline for the whole run
    pub fn run_budget(&self, scenarios: &[Scenario]) -> Duration {
        let budgets = scenarios.iter().map(Scenario::budget);
        let total = if self.concurrent {
            budgets.max().unwrap_or_default()
        } else {
            budgets.fold(Duration::ZERO, Duration::saturating_add)
        };
        total.saturating_add(self.grace)
    }
}

struct Tracker<'a> {
    scenario: &'a Scenario,
    id: Uuid,
    start: Instant,
}

impl Tracker<'_> {
    fn enter(&self, phase: Phase) {
        debug!(
            scenario = %self.scenario.name,
            notification_id = %self.id,
            ?phase,
            elapsed_ms = millis(self.start.elapsed()),
            "Scenario phase"
        );
    }

    fn resolve(self, outcome: Outcome) -> ScenarioResult {
        self.enter(Phase::Resolved);
        let elapsed = self.start.elapsed();
        match &outcome {
            Outcome::Passed => info!(
                scenario = %self.scenario.name,
                notification_id = %self.id,
                elapsed_ms = millis(elapsed),
                "Scenario passed"
            ),
            Outcome::Failed(failure) => warn!(
                scenario = %self.scenario.name,
                notification_id = %self.id,
                elapsed_ms = millis(elapsed),
                diagnostic = %failure.diagnostic(),
                "Scenario failed"
            ),
        }
        ScenarioResult {
            name: self.scenario.name.clone(),
            kind: self.scenario.kind,
            notification_id: self.id,
            outcome,
            elapsed,
        }
    }
}

/// Run one scenario against the store
#[instrument(skip_all, fields(scenario = %scenario.name, kind = %scenario.kind))]
pub async fn run_scenario<S>(store: &S, scenario: &Scenario) -> Result<ScenarioResult>
where
    S: NotificationStore + ?Sized,
{
    let start = Instant::now();
    let record = scenario.build_record(Utc::now())?;
    let id = store.insert(&record).await?;
    info!(notification_id = %id, deliver_at = ?record.deliver_at, "Inserted notification");

    let tracker = Tracker {
        scenario,
        id,
        start,
    };
    tracker.enter(Phase::Injected);

    if scenario.kind == ScenarioKind::Scheduled {
        // Instantaneous read: must describe the state right after insert
        match snapshot(store, id).await? {
            None => return Ok(tracker.resolve(Outcome::Failed(Failure::NotVisible))),
            Some(status) if status.is_processed => {
                return Ok(tracker.resolve(Outcome::Failed(Failure::ProcessedEarly { status })))
            }
            Some(_) => tracker.enter(Phase::EarlyChecked),
        }

        let wait = scenario.delay.saturating_add(scenario.buffer);
        debug!(notification_id = %id, wait_ms = millis(wait), "Waiting for delivery time");
        sleep(wait).await;
    }

    tracker.enter(Phase::Awaiting);
    let outcome = poll_until(store, id, processed, scenario.poll).await?;
    if !outcome.satisfied {
        return Ok(tracker.resolve(Outcome::Failed(Failure::TimedOut {
            last: outcome.last,
            waited: outcome.elapsed,
            observations: outcome.observations,
        })));
    }

    match snapshot(store, id).await? {
        Some(status) if !status.is_processed => {
            Ok(tracker.resolve(Outcome::Failed(Failure::Regressed { status })))
        }
        _ => Ok(tracker.resolve(Outcome::Passed)),
    }
}

/// Run every scenario, handing each result to `on_result` in definition order
///
/// Sequential runs report each scenario as soon as it resolves, so results
/// that finished before a fatal error are never lost. Concurrent runs report
/// every scenario that resolved once they have all settled, then return the
/// first store error, if any.
///
/// The whole run is bounded by [`RunOptions::run_budget`]; running past it is
/// a fatal [`Error::RunTimeout`].
pub async fn run_all<S, F>(
    store: &S,
    scenarios: &[Scenario],
    options: &RunOptions,
    mut on_result: F,
) -> Result<()>
where
    S: NotificationStore + ?Sized,
    F: FnMut(ScenarioResult),
{
    let budget = options.run_budget(scenarios);
    info!(
        scenarios = scenarios.len(),
        concurrent = options.concurrent,
        budget_ms = millis(budget),
        "Starting run"
    );

    let run = async {
        if options.concurrent {
            let settled = join_all(scenarios.iter().map(|s| run_scenario(store, s))).await;
            let mut first_error = None;
            for result in settled {
                match result {
                    Ok(result) => on_result(result),
                    Err(e) => {
                        first_error.get_or_insert(e);
                    }
                }
            }
            first_error.map_or(Ok(()), Err)
        } else {
            for scenario in scenarios {
                on_result(run_scenario(store, scenario).await?);
            }
            Ok::<_, Error>(())
        }
    };

    timeout(budget, run)
        .await
        .map_err(|_| Error::RunTimeout(budget))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::config::PollingConfig;
    use crate::harness::scenario::{builtin_specs, resolve_all};
    use crate::store::{MemoryStore, WorkerBehavior, BROADCAST_RECIPIENT};

    fn scenario(kind: ScenarioKind) -> Scenario {
        let all = resolve_all(&builtin_specs(), &PollingConfig::default(), &[]).unwrap();
        all.into_iter().find(|s| s.kind == kind).unwrap()
    }

    async fn collect_all(
        store: &MemoryStore,
        scenarios: &[Scenario],
        options: &RunOptions,
    ) -> (Result<()>, Vec<ScenarioResult>) {
        let mut results = Vec::new();
        let outcome = run_all(store, scenarios, options, |r| results.push(r)).await;
        (outcome, results)
    }

    fn failure(result: &ScenarioResult) -> &Failure {
        match &result.outcome {
            Outcome::Failed(f) => f,
            Outcome::Passed => panic!("expected failure, scenario passed"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_immediate_passes_with_prompt_worker() {
        let store = MemoryStore::honoring(Duration::from_millis(300));
        let result = run_scenario(&store, &scenario(ScenarioKind::Immediate))
            .await
            .unwrap();

        assert_eq!(result.outcome, Outcome::Passed);
        assert!(result.elapsed < Duration::from_secs(1));
        let record = store.record(result.notification_id).unwrap();
        assert!(record.deliver_at.is_none());
        assert_eq!(record.priority.as_deref(), Some("high"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_immediate_times_out_with_stalled_worker() {
        let store = MemoryStore::new(WorkerBehavior::Stalled);
        let result = run_scenario(&store, &scenario(ScenarioKind::Immediate))
            .await
            .unwrap();

        match failure(&result) {
            Failure::TimedOut {
                last, observations, ..
            } => {
                assert_eq!(last.as_ref(), Some(&crate::store::RecordStatus::pending()));
                assert_eq!(*observations, 21);
            }
            other => panic!("unexpected failure {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduled_passes_when_worker_waits() {
        let store = MemoryStore::honoring(Duration::from_millis(200));
        let result = run_scenario(&store, &scenario(ScenarioKind::Scheduled))
            .await
            .unwrap();

        assert_eq!(result.outcome, Outcome::Passed);
        // Slept delay + buffer, then the first poll read succeeded
        assert!(result.elapsed >= Duration::from_secs(7));
        assert!(result.elapsed < Duration::from_secs(8));
        assert!(store.record(result.notification_id).unwrap().deliver_at.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduled_fails_fast_when_processed_early() {
        let store = MemoryStore::new(WorkerBehavior::Eager);
        let result = run_scenario(&store, &scenario(ScenarioKind::Scheduled))
            .await
            .unwrap();

        assert!(matches!(failure(&result), Failure::ProcessedEarly { .. }));
        // No waiting once the early check fails
        assert_eq!(result.elapsed, Duration::ZERO);
        assert_eq!(store.reads(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduled_requires_visible_record() {
        let store = MemoryStore::new(WorkerBehavior::Invisible);
        let result = run_scenario(&store, &scenario(ScenarioKind::Scheduled))
            .await
            .unwrap();

        assert_eq!(failure(&result), &Failure::NotVisible);
    }

    #[tokio::test(start_paused = true)]
    async fn test_broadcast_uses_sentinel_and_same_bound() {
        let store = MemoryStore::honoring(Duration::from_millis(300));
        let result = run_scenario(&store, &scenario(ScenarioKind::Broadcast))
            .await
            .unwrap();

        assert_eq!(result.outcome, Outcome::Passed);
        let record = store.record(result.notification_id).unwrap();
        assert_eq!(record.recipient, BROADCAST_RECIPIENT);
    }

    #[tokio::test(start_paused = true)]
    async fn test_broadcast_fails_when_worker_ignores_sentinel() {
        let store = MemoryStore::honoring(Duration::ZERO)
            .with_broadcast_behavior(WorkerBehavior::Stalled);
        let result = run_scenario(&store, &scenario(ScenarioKind::Broadcast))
            .await
            .unwrap();

        assert!(matches!(failure(&result), Failure::TimedOut { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_observed_is_distinct() {
        let store = MemoryStore::new(WorkerBehavior::Invisible);
        let result = run_scenario(&store, &scenario(ScenarioKind::Immediate))
            .await
            .unwrap();

        assert!(matches!(
            failure(&result),
            Failure::TimedOut { last: None, .. }
        ));
        assert!(result.diagnostic().unwrap().contains("never observed"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reverted_state_is_a_failure() {
        let store = MemoryStore::new(WorkerBehavior::Flapping {
            latency: Duration::from_millis(100),
        });
        let result = run_scenario(&store, &scenario(ScenarioKind::Immediate))
            .await
            .unwrap();

        assert!(matches!(failure(&result), Failure::Regressed { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_failure_aborts_run() {
        let store = MemoryStore::honoring(Duration::from_secs(60)).with_read_budget(2);
        let scenarios = resolve_all(&builtin_specs(), &PollingConfig::default(), &[]).unwrap();

        let (outcome, results) = collect_all(&store, &scenarios, &RunOptions::default()).await;

        assert!(outcome.unwrap_err().is_store_failure());
        // First scenario failed mid-poll; later scenarios never inserted
        assert!(results.is_empty());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_results_before_store_failure_are_reported() {
        // Immediate spends two reads (poll, confirm); the scheduled early check is the third
        let store = MemoryStore::honoring(Duration::ZERO).with_read_budget(2);
        let scenarios = resolve_all(&builtin_specs(), &PollingConfig::default(), &[]).unwrap();

        let (outcome, results) = collect_all(&store, &scenarios, &RunOptions::default()).await;

        assert!(outcome.unwrap_err().is_store_failure());
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].kind, ScenarioKind::Immediate);
        assert!(results[0].outcome.passed());
        assert_eq!(store.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_store_failure_keeps_settled_results() {
        let store = MemoryStore::honoring(Duration::ZERO).with_read_budget(2);
        let scenarios = resolve_all(&builtin_specs(), &PollingConfig::default(), &[]).unwrap();
        let options = RunOptions {
            concurrent: true,
            ..RunOptions::default()
        };

        let (outcome, results) = collect_all(&store, &scenarios, &options).await;

        assert!(outcome.unwrap_err().is_store_failure());
        assert!(results.len() < 3);
        assert_eq!(store.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_assertion_failure_does_not_stop_later_scenarios() {
        let store = MemoryStore::honoring(Duration::ZERO)
            .with_broadcast_behavior(WorkerBehavior::Stalled);
        let mut scenarios = resolve_all(&builtin_specs(), &PollingConfig::default(), &[]).unwrap();
        scenarios.rotate_left(2); // broadcast first

        let (outcome, results) = collect_all(&store, &scenarios, &RunOptions::default()).await;

        outcome.unwrap();
        assert_eq!(results.len(), 3);
        assert!(!results[0].outcome.passed());
        assert!(results[1].outcome.passed());
        assert!(results[2].outcome.passed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_run_overlaps_and_keeps_order() {
        let store = MemoryStore::honoring(Duration::from_millis(400));
        let scenarios = resolve_all(&builtin_specs(), &PollingConfig::default(), &[]).unwrap();
        let options = RunOptions {
            concurrent: true,
            ..RunOptions::default()
        };

        let start = Instant::now();
        let (outcome, results) = collect_all(&store, &scenarios, &options).await;
        outcome.unwrap();

        let kinds: Vec<ScenarioKind> = results.iter().map(|r| r.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ScenarioKind::Immediate,
                ScenarioKind::Scheduled,
                ScenarioKind::Broadcast
            ]
        );
        assert!(results.iter().all(|r| r.outcome.passed()));
        // Bounded by the scheduled scenario alone
        assert!(start.elapsed() < Duration::from_secs(8));
        let ids: std::collections::HashSet<Uuid> =
            results.iter().map(|r| r.notification_id).collect();
        assert_eq!(ids.len(), 3);
    }

    #[test]
    fn test_run_budget_sum_vs_max() {
        let scenarios = resolve_all(&builtin_specs(), &PollingConfig::default(), &[]).unwrap();
        let sequential = RunOptions::default().run_budget(&scenarios);
        let concurrent = RunOptions {
            concurrent: true,
            ..RunOptions::default()
        }
        .run_budget(&scenarios);

        // 10.5 + 12.5 + 10.5 + 5 grace
        assert_eq!(sequential, Duration::from_millis(38_500));
        // 12.5 + 5 grace
        assert_eq!(concurrent, Duration::from_millis(17_500));
    }

    #[test]
    fn test_run_budget_saturates_instead_of_overflowing() {
        let mut huge = scenario(ScenarioKind::Scheduled);
        huge.delay = Duration::MAX;
        let scenarios = vec![huge.clone(), huge];

        assert_eq!(RunOptions::default().run_budget(&scenarios), Duration::MAX);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_timeout_is_fatal() {
        // Slow reads push the poll past the budget computed from its timeout
        let store = MemoryStore::new(WorkerBehavior::Stalled).with_read_latency(Duration::from_secs(2));
        let options = RunOptions {
            concurrent: false,
            grace: Duration::ZERO,
        };

        let (outcome, results) =
            collect_all(&store, &[scenario(ScenarioKind::Immediate)], &options).await;

        assert!(matches!(outcome, Err(Error::RunTimeout(d)) if d == Duration::from_millis(10_500)));
        assert!(results.is_empty());
    }
}
