//! Scenario outcomes and the run summary
//!
//! The reporter has no store dependency: it only aggregates what the runner
//! hands it and decides the process exit status.

use std::time::Duration;

use colored::Colorize;
use serde::Serialize;
use uuid::Uuid;

use super::scenario::ScenarioKind;
use crate::common::millis;
use crate::store::RecordStatus;

/// Exit status when every scenario passed
pub const EXIT_PASSED: i32 = 0;
/// Exit status when at least one scenario failed
pub const EXIT_FAILED: i32 = 1;
/// Exit status when the run itself could not complete
pub const EXIT_FATAL: i32 = 2;

/// Why a scenario failed
#[derive(Debug, Clone, PartialEq)]
pub enum Failure {
    /// The record was already processed when it had to be pending
    ProcessedEarly { status: RecordStatus },
    /// The record was not readable right after its own insert
    NotVisible,
    /// The record never became processed within the timeout
    TimedOut {
        last: Option<RecordStatus>,
        waited: Duration,
        observations: u32,
    },
    /// A confirming read saw the record pending again after it was processed
    Regressed { status: RecordStatus },
}

impl Failure {
    pub fn diagnostic(&self) -> String {
        match self {
            Failure::ProcessedEarly { status } => {
                format!("processed too early ({})", status)
            }
            Failure::NotVisible => "record not visible immediately after insert".to_string(),
            Failure::TimedOut {
                last: None,
                waited,
                observations,
            } => format!(
                "timed out after {:.1}s: record never observed ({} reads)",
                waited.as_secs_f64(),
                observations
            ),
            Failure::TimedOut {
                last: Some(status),
                waited,
                observations,
            } => format!(
                "timed out after {:.1}s: never processed ({} reads, last: {})",
                waited.as_secs_f64(),
                observations,
                status
            ),
            Failure::Regressed { status } => {
                format!("processed state reverted ({})", status)
            }
        }
    }
}

/// Result of one scenario
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Passed,
    Failed(Failure),
}

impl Outcome {
    pub fn passed(&self) -> bool {
        matches!(self, Outcome::Passed)
    }
}

/// Everything the reporter needs about one finished scenario
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioResult {
    pub name: String,
    pub kind: ScenarioKind,
    pub notification_id: Uuid,
    pub outcome: Outcome,
    pub elapsed: Duration,
}

impl ScenarioResult {
    pub fn diagnostic(&self) -> Option<String> {
        match &self.outcome {
            Outcome::Passed => None,
            Outcome::Failed(failure) => Some(failure.diagnostic()),
        }
    }
}

/// Console decoration for a line of output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Header,
    Info,
    Pass,
    Fail,
}

/// Decorate `text` for `status`
///
/// Colors are decided per call; disabling them (for example with
/// `NO_COLOR`) is handled by the `colored` crate.
pub fn decorate(status: Status, text: &str) -> String {
    match status {
        Status::Header => text.magenta().bold().to_string(),
        Status::Info => text.blue().to_string(),
        Status::Pass => text.green().to_string(),
        Status::Fail => text.red().to_string(),
    }
}

/// One human-readable line for a scenario result
pub fn result_line(result: &ScenarioResult) -> String {
    let elapsed = format!("{:.1}s", result.elapsed.as_secs_f64());
    match result.diagnostic() {
        None => format!(
            "  {} {} [{}] {}",
            decorate(Status::Pass, "✓"),
            result.name,
            result.kind,
            elapsed.dimmed()
        ),
        Some(diagnostic) => format!(
            "  {} {} [{}] {}: {} ({})",
            decorate(Status::Fail, "✗"),
            result.name,
            result.kind,
            elapsed.dimmed(),
            decorate(Status::Fail, &diagnostic),
            result.notification_id
        ),
    }
}

/// Machine-readable run summary
#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub passed: bool,
    pub total: usize,
    pub failed: usize,
    pub scenarios: Vec<SummaryEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SummaryEntry {
    pub name: String,
    pub kind: ScenarioKind,
    pub notification_id: Uuid,
    pub passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
    pub elapsed_ms: u64,
}

/// Collects scenario results in the order they are recorded
#[derive(Debug, Default)]
pub struct Reporter {
    results: Vec<ScenarioResult>,
}

impl Reporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a finished scenario, returning its report line
    pub fn record(&mut self, result: ScenarioResult) -> String {
        let line = result_line(&result);
        self.results.push(result);
        line
    }

    pub fn results(&self) -> &[ScenarioResult] {
        &self.results
    }

    pub fn failed(&self) -> usize {
        self.results.iter().filter(|r| !r.outcome.passed()).count()
    }

    /// True when at least one scenario ran and none failed
    pub fn summarize(&self) -> bool {
        !self.results.is_empty() && self.failed() == 0
    }

    pub fn exit_code(&self) -> i32 {
        if self.summarize() {
            EXIT_PASSED
        } else {
            EXIT_FAILED
        }
    }

    pub fn summary(&self) -> Summary {
        Summary {
            passed: self.summarize(),
            total: self.results.len(),
            failed: self.failed(),
            scenarios: self
                .results
                .iter()
                .map(|r| SummaryEntry {
                    name: r.name.clone(),
                    kind: r.kind,
                    notification_id: r.notification_id,
                    passed: r.outcome.passed(),
                    diagnostic: r.diagnostic(),
                    elapsed_ms: millis(r.elapsed),
                })
                .collect(),
        }
    }

    /// Summary of a run cut short by a fatal error; never reports a pass
    pub fn aborted_summary(&self) -> Summary {
        Summary {
            passed: false,
            ..self.summary()
        }
    }

    /// Final console line of a run cut short by a fatal error
    pub fn aborted_line(&self, planned: usize) -> String {
        format!(
            "Run aborted after {} of {} scenarios ({} failed)",
            self.results.len(),
            planned,
            self.failed()
        )
        .red()
        .bold()
        .to_string()
    }

    /// Final line of the console report
    pub fn summary_line(&self) -> String {
        let total = self.results.len();
        let failed = self.failed();
        if self.summarize() {
            format!("All {} scenarios passed", total)
                .green()
                .bold()
                .to_string()
        } else {
            format!("{} of {} scenarios failed", failed, total)
                .red()
                .bold()
                .to_string()
        }
    }
}
