//! Store client
//!
//! The harness talks to the shared store through exactly two operations:
//! insert one record, and read one record's mutable status by id.

pub mod memory;
mod postgres;
mod record;

use async_trait::async_trait;
use uuid::Uuid;

use crate::common::Result;

pub use memory::{MemoryStore, WorkerBehavior};
pub use postgres::PgStore;
pub use record::{NewNotification, RecordStatus, BROADCAST_RECIPIENT};

/// Access to the shared notification store
#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Write a new record, returning its id
    ///
    /// Fails with `StoreUnavailable` if the write is rejected.
    async fn insert(&self, record: &NewNotification) -> Result<Uuid>;

    /// Point read of a record's mutable state; `Ok(None)` if not visible yet
    async fn fetch_status(&self, id: Uuid) -> Result<Option<RecordStatus>>;

    /// Release connections. Called once on every exit path.
    async fn close(&self) {}
}
