//! Notification record types
//!
//! The harness only ever creates records and reads back their mutable state.
//! Everything else about a record belongs to the worker.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Recipient value meaning "deliver to every user"
pub const BROADCAST_RECIPIENT: Uuid = Uuid::nil();

/// A record to insert into the shared store
#[derive(Debug, Clone, PartialEq)]
pub struct NewNotification {
    pub id: Uuid,
    pub recipient: Uuid,
    pub title: String,
    pub body: String,
    pub category: String,
    pub priority: Option<String>,
    /// `None` leaves the store default in place, which means "now"
    pub deliver_at: Option<DateTime<Utc>>,
}

impl NewNotification {
    /// A record for a random recipient, eligible for delivery immediately
    pub fn immediate(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            recipient: Uuid::new_v4(),
            title: title.into(),
            body: body.into(),
            category: "system".to_string(),
            priority: None,
            deliver_at: None,
        }
    }

    /// A record that must not be delivered before `deliver_at`
    pub fn scheduled(
        title: impl Into<String>,
        body: impl Into<String>,
        deliver_at: DateTime<Utc>,
    ) -> Self {
        Self {
            deliver_at: Some(deliver_at),
            ..Self::immediate(title, body)
        }
    }

    /// A record addressed to the broadcast sentinel
    pub fn broadcast(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            recipient: BROADCAST_RECIPIENT,
            ..Self::immediate(title, body)
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_priority(mut self, priority: Option<String>) -> Self {
        self.priority = priority;
        self
    }

    pub fn is_broadcast(&self) -> bool {
        self.recipient == BROADCAST_RECIPIENT
    }
}

/// Mutable state of a record as written by the worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct RecordStatus {
    pub is_processed: bool,
    pub error_count: i32,
    pub last_error: Option<String>,
}

impl RecordStatus {
    /// State of a record nobody has touched yet
    pub fn pending() -> Self {
        Self {
            is_processed: false,
            error_count: 0,
            last_error: None,
        }
    }
}

impl std::fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "is_processed={}, error_count={}",
            self.is_processed, self.error_count
        )?;
        if let Some(err) = &self.last_error {
            write!(f, ", last_error={:?}", err)?;
        }
        Ok(())
    }
}
