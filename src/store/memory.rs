//! In-memory store with a scripted worker
//!
//! Test double for [`NotificationStore`]. Each inserted record gets a
//! processing time computed from the configured [`WorkerBehavior`], and reads
//! report the state that time implies. Time is measured with
//! `tokio::time::Instant`, so tests can run under a paused clock.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::time::Instant;
use uuid::Uuid;

use super::{NewNotification, NotificationStore, RecordStatus};
use crate::common::{Error, Result};

/// How the simulated worker treats inserted records
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerBehavior {
    /// Processes `latency` after the record becomes eligible
    Honor { latency: Duration },
    /// Processes on insert, ignoring `deliver_at`
    Eager,
    /// Never processes anything
    Stalled,
    /// Records are never visible to reads
    Invisible,
    /// Every delivery attempt fails; the record stays pending with errors
    Failing { message: String },
    /// Reports processed on exactly one read after `latency`, then pending again
    Flapping { latency: Duration },
}

#[derive(Debug)]
struct StoredRecord {
    record: NewNotification,
    behavior: WorkerBehavior,
    inserted: Instant,
    /// When `deliver_at` falls due, translated onto the tokio clock at insert
    eligible_at: Instant,
    processed_reads: usize,
}

impl StoredRecord {
    fn new(record: NewNotification, behavior: WorkerBehavior) -> Self {
        let inserted = Instant::now();
        let delay = record
            .deliver_at
            .and_then(|at| (at - Utc::now()).to_std().ok())
            .unwrap_or_default();
        Self {
            record,
            behavior,
            inserted,
            eligible_at: inserted + delay,
            processed_reads: 0,
        }
    }

    fn observe(&mut self, now: Instant) -> Option<RecordStatus> {
        let mut status = RecordStatus::pending();
        match &self.behavior {
            WorkerBehavior::Honor { latency } => {
                status.is_processed = now >= self.eligible_at + *latency;
            }
            WorkerBehavior::Eager => status.is_processed = true,
            WorkerBehavior::Stalled => {}
            WorkerBehavior::Invisible => return None,
            WorkerBehavior::Failing { message } => {
                status.error_count = 3;
                status.last_error = Some(message.clone());
            }
            WorkerBehavior::Flapping { latency } => {
                if now >= self.inserted + *latency {
                    self.processed_reads += 1;
                    status.is_processed = self.processed_reads == 1;
                }
            }
        }
        Some(status)
    }
}

/// In-memory [`NotificationStore`]
#[derive(Debug)]
pub struct MemoryStore {
    behavior: WorkerBehavior,
    broadcast_behavior: Option<WorkerBehavior>,
    records: Mutex<HashMap<Uuid, StoredRecord>>,
    reads: AtomicUsize,
    read_budget: Option<usize>,
    read_latency: Duration,
    unavailable: AtomicBool,
    closed: AtomicBool,
}

impl MemoryStore {
    pub fn new(behavior: WorkerBehavior) -> Self {
        Self {
            behavior,
            broadcast_behavior: None,
            records: Mutex::new(HashMap::new()),
            reads: AtomicUsize::new(0),
            read_budget: None,
            read_latency: Duration::ZERO,
            unavailable: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    /// A worker that processes eligible records after `latency`
    pub fn honoring(latency: Duration) -> Self {
        Self::new(WorkerBehavior::Honor { latency })
    }

    /// Use a different behavior for records addressed to the broadcast sentinel
    pub fn with_broadcast_behavior(mut self, behavior: WorkerBehavior) -> Self {
        self.broadcast_behavior = Some(behavior);
        self
    }

    /// Fail every read after `reads` successful ones
    pub fn with_read_budget(mut self, reads: usize) -> Self {
        self.read_budget = Some(reads);
        self
    }

    /// Delay every read, as a slow or overloaded store would
    pub fn with_read_latency(mut self, latency: Duration) -> Self {
        self.read_latency = latency;
        self
    }

    /// Make every subsequent operation fail as if the connection dropped
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of `fetch_status` calls served so far
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Number of records inserted so far
    pub fn len(&self) -> usize {
        self.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The stored copy of an inserted record
    pub fn record(&self, id: Uuid) -> Option<NewNotification> {
        self.lock().ok()?.get(&id).map(|r| r.record.clone())
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<Uuid, StoredRecord>>> {
        self.records
            .lock()
            .map_err(|_| Error::Internal("memory store lock poisoned".into()))
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) || self.is_closed() {
            return Err(Error::StoreUnavailable("connection refused".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl NotificationStore for MemoryStore {
    async fn insert(&self, record: &NewNotification) -> Result<Uuid> {
        self.check_available()?;
        let behavior = match &self.broadcast_behavior {
            Some(b) if record.is_broadcast() => b.clone(),
            _ => self.behavior.clone(),
        };
        let mut records = self.lock()?;
        if records.contains_key(&record.id) {
            return Err(Error::StoreUnavailable(format!(
                "duplicate key value violates unique constraint (id={})",
                record.id
            )));
        }
        records.insert(record.id, StoredRecord::new(record.clone(), behavior));
        Ok(record.id)
    }

    async fn fetch_status(&self, id: Uuid) -> Result<Option<RecordStatus>> {
        self.check_available()?;
        if !self.read_latency.is_zero() {
            tokio::time::sleep(self.read_latency).await;
        }
        let served = self.reads.fetch_add(1, Ordering::SeqCst);
        if self.read_budget.is_some_and(|budget| served >= budget) {
            return Err(Error::StoreUnavailable("server closed the connection".into()));
        }
        let now = Instant::now();
        Ok(self.lock()?.get_mut(&id).and_then(|r| r.observe(now)))
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
