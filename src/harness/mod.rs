//! Delivery-policy verification
//!
//! Injects notification records with a given delivery policy, waits for the
//! external worker to act on them, and reports a pass/fail result per
//! scenario.

pub mod poll;
pub mod report;
pub mod runner;
pub mod scenario;

pub use poll::{poll_until, snapshot, PollOptions, PollOutcome};
pub use report::{decorate, Failure, Outcome, Reporter, ScenarioResult, Status, Summary};
pub use runner::{run_all, run_scenario, Phase, RunOptions};
pub use scenario::{Scenario, ScenarioKind, ScenarioSpec};
