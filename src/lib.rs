//! Notification delivery E2E harness
//!
//! Verifies, from outside, that a notification worker moves records from
//! pending to processed under immediate, scheduled, and broadcast delivery.

pub mod cli;
pub mod commands;
pub mod common;
pub mod harness;
pub mod store;

// Re-export commonly used types for tests
pub use common::{Error, Result};
pub use harness::{Outcome, Reporter, Scenario, ScenarioKind};
