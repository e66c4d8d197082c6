//! Bounded polling over a record's status
//!
//! [`poll_until`] repeatedly reads one record until a predicate holds or the
//! deadline passes. [`snapshot`] is the single-read counterpart for checks
//! that must describe one instant, such as "not processed yet".

use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::{debug, trace};
use uuid::Uuid;

use crate::common::{millis, Error, Result};
use crate::store::{NotificationStore, RecordStatus};

/// Timing for one polling phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOptions {
    pub timeout: Duration,
    pub interval: Duration,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            interval: Duration::from_millis(500),
        }
    }
}

impl PollOptions {
    pub fn new(timeout: Duration, interval: Duration) -> Self {
        Self { timeout, interval }
    }

    /// Upper bound on wall time spent in one poll, excluding store latency
    pub fn budget(&self) -> Duration {
        self.timeout.saturating_add(self.interval)
    }
}

/// What a polling phase saw
#[derive(Debug, Clone, PartialEq)]
pub struct PollOutcome {
    /// Whether the predicate held on some read
    pub satisfied: bool,
    /// Most recent status read; `None` if the record was never visible
    pub last: Option<RecordStatus>,
    /// Number of reads performed
    pub observations: u32,
    pub elapsed: Duration,
}

impl PollOutcome {
    /// The record was never visible during the whole window
    pub fn never_observed(&self) -> bool {
        self.last.is_none()
    }
}

/// Read `id` until `predicate` holds or `options.timeout` elapses
///
/// Returns as soon as a read satisfies the predicate. A record that is not
/// visible yet counts as "not satisfied", never as an error; only store
/// failures are returned as `Err`. The loop never sleeps past the deadline:
/// the last sleep is shortened so one final read happens at the deadline.
pub async fn poll_until<S, P>(
    store: &S,
    id: Uuid,
    predicate: P,
    options: PollOptions,
) -> Result<PollOutcome>
where
    S: NotificationStore + ?Sized,
    P: Fn(&RecordStatus) -> bool,
{
    let start = Instant::now();
    let deadline = start.checked_add(options.timeout).ok_or_else(|| {
        Error::Config(format!("poll timeout of {:?} is out of range", options.timeout))
    })?;
    let mut last = None;
    let mut observations = 0u32;

    loop {
        let status = store.fetch_status(id).await?;
        observations += 1;

        match status {
            Some(status) => {
                trace!(notification_id = %id, %status, observations, "Poll read");
                let satisfied = predicate(&status);
                last = Some(status);
                if satisfied {
                    let elapsed = start.elapsed();
                    debug!(
                        notification_id = %id,
                        observations,
                        elapsed_ms = millis(elapsed),
                        "Poll satisfied"
                    );
                    return Ok(PollOutcome {
                        satisfied: true,
                        last,
                        observations,
                        elapsed,
                    });
                }
            }
            None => trace!(notification_id = %id, observations, "Poll read: not visible yet"),
        }

        let now = Instant::now();
        if now >= deadline {
            let elapsed = start.elapsed();
            debug!(
                notification_id = %id,
                observations,
                elapsed_ms = millis(elapsed),
                observed = last.is_some(),
                "Poll timed out"
            );
            return Ok(PollOutcome {
                satisfied: false,
                last,
                observations,
                elapsed,
            });
        }

        sleep(options.interval.min(deadline - now)).await;
    }
}

/// One immediate read with no retry
pub async fn snapshot<S>(store: &S, id: Uuid) -> Result<Option<RecordStatus>>
where
    S: NotificationStore + ?Sized,
{
    let status = store.fetch_status(id).await?;
    trace!(notification_id = %id, found = status.is_some(), "Snapshot read");
    Ok(status)
}

/// Predicate: the worker has finished delivery
pub fn processed(status: &RecordStatus) -> bool {
    status.is_processed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, NewNotification, WorkerBehavior};

    async fn insert(store: &MemoryStore) -> Uuid {
        store
            .insert(&NewNotification::immediate("poll", "test"))
            .await
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_returns_as_soon_as_satisfied() {
        let store = MemoryStore::honoring(Duration::from_millis(1200));
        let id = insert(&store).await;

        let outcome = poll_until(&store, id, processed, PollOptions::default())
            .await
            .unwrap();

        assert!(outcome.satisfied);
        assert!(outcome.last.unwrap().is_processed);
        // Reads at 0, 0.5, 1.0, 1.5s; the fourth is the first past 1.2s
        assert_eq!(outcome.observations, 4);
        assert!(outcome.elapsed >= Duration::from_millis(1500));
        assert!(outcome.elapsed < Duration::from_millis(1600));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unrepresentable_timeout_is_an_error() {
        let store = MemoryStore::new(WorkerBehavior::Eager);
        let id = insert(&store).await;
        let options = PollOptions::new(Duration::MAX, Duration::from_millis(500));

        assert_eq!(options.budget(), Duration::MAX);
        let err = poll_until(&store, id, processed, options).await.unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert_eq!(store.reads(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_already_satisfied_needs_one_read() {
        let store = MemoryStore::new(WorkerBehavior::Eager);
        let id = insert(&store).await;

        let outcome = poll_until(&store, id, processed, PollOptions::default())
            .await
            .unwrap();

        assert!(outcome.satisfied);
        assert_eq!(outcome.observations, 1);
        assert_eq!(outcome.elapsed, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_with_last_status() {
        let store = MemoryStore::new(WorkerBehavior::Failing {
            message: "no devices registered".into(),
        });
        let id = insert(&store).await;

        let outcome = poll_until(&store, id, processed, PollOptions::default())
            .await
            .unwrap();

        assert!(!outcome.satisfied);
        assert!(!outcome.never_observed());
        let last = outcome.last.unwrap();
        assert_eq!(last.error_count, 3);
        assert_eq!(last.last_error.as_deref(), Some("no devices registered"));
        // 0.0 through 10.0s inclusive at 0.5s spacing
        assert_eq!(outcome.observations, 21);
        assert!(outcome.elapsed >= Duration::from_secs(10));
        assert!(outcome.elapsed < Duration::from_millis(10_100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_visible_reports_none() {
        let store = MemoryStore::new(WorkerBehavior::Invisible);
        let id = insert(&store).await;

        let outcome = poll_until(
            &store,
            id,
            processed,
            PollOptions::new(Duration::from_secs(2), Duration::from_millis(500)),
        )
        .await
        .unwrap();

        assert!(!outcome.satisfied);
        assert!(outcome.never_observed());
        assert_eq!(outcome.observations, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_last_sleep_is_clamped_to_deadline() {
        let store = MemoryStore::new(WorkerBehavior::Stalled);
        let id = insert(&store).await;

        let outcome = poll_until(
            &store,
            id,
            processed,
            PollOptions::new(Duration::from_millis(1200), Duration::from_millis(500)),
        )
        .await
        .unwrap();

        assert!(!outcome.satisfied);
        // Reads at 0, 0.5, 1.0 and the deadline at 1.2s
        assert_eq!(outcome.observations, 4);
        assert!(outcome.elapsed >= Duration::from_millis(1200));
        assert!(outcome.elapsed < Duration::from_millis(1300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_failure_propagates() {
        let store = MemoryStore::new(WorkerBehavior::Stalled).with_read_budget(3);
        let id = insert(&store).await;

        let err = poll_until(&store, id, processed, PollOptions::default())
            .await
            .unwrap_err();

        assert!(err.is_store_failure());
        assert_eq!(store.reads(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_predicate_sees_every_visible_read() {
        let store = MemoryStore::new(WorkerBehavior::Failing {
            message: "boom".into(),
        });
        let id = insert(&store).await;

        let outcome = poll_until(
            &store,
            id,
            |s: &RecordStatus| s.error_count > 0,
            PollOptions::default(),
        )
        .await
        .unwrap();

        assert!(outcome.satisfied);
        assert_eq!(outcome.observations, 1);
    }

    #[tokio::test]
    async fn test_snapshot_is_a_pure_read() {
        let store = MemoryStore::new(WorkerBehavior::Stalled);
        let id = insert(&store).await;

        let first = snapshot(&store, id).await.unwrap();
        let second = snapshot(&store, id).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first, Some(RecordStatus::pending()));
        assert_eq!(store.reads(), 2);
        assert_eq!(snapshot(&store, Uuid::new_v4()).await.unwrap(), None);
    }
}
