//! Scenario definitions
//!
//! Scenarios are data. The three delivery policies are built in; a YAML file
//! can replace the set, for example to add a second broadcast with a
//! different category:
//!
//! ```yaml
//! scenarios:
//!   - name: Scheduled, short delay
//!     kind: scheduled
//!     delay_secs: 2
//!     timeout_secs: 3
//! ```

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::poll::PollOptions;
use crate::common::config::{check_wait, PollingConfig};
use crate::common::{Error, Result};
use crate::store::NewNotification;

/// Delivery policy under test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioKind {
    /// No `deliver_at`; must be processed within the poll timeout
    Immediate,
    /// `deliver_at` in the future; must stay pending until then
    Scheduled,
    /// Addressed to the broadcast sentinel; same bound as immediate
    Broadcast,
}

impl std::fmt::Display for ScenarioKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ScenarioKind::Immediate => "immediate",
            ScenarioKind::Scheduled => "scheduled",
            ScenarioKind::Broadcast => "broadcast",
        })
    }
}

/// A scenario file
#[derive(Deserialize, Debug)]
pub struct ScenarioFile {
    pub scenarios: Vec<ScenarioSpec>,
}

/// One scenario as written in a file; unset timings come from configuration
#[derive(Deserialize, Debug, Clone)]
pub struct ScenarioSpec {
    pub name: String,
    pub kind: ScenarioKind,
    pub title: Option<String>,
    pub body: Option<String>,
    #[serde(default = "default_category")]
    pub category: String,
    pub priority: Option<String>,
    /// Scheduled only: seconds until `deliver_at`
    pub delay_secs: Option<u64>,
    /// Scheduled only: extra wait after `deliver_at` before polling
    pub buffer_secs: Option<u64>,
    pub timeout_secs: Option<u64>,
    pub interval_ms: Option<u64>,
}

fn default_category() -> String {
    "system".to_string()
}

/// A scenario with every timing resolved
#[derive(Debug, Clone, PartialEq)]
pub struct Scenario {
    pub name: String,
    pub kind: ScenarioKind,
    pub title: String,
    pub body: String,
    pub category: String,
    pub priority: Option<String>,
    pub poll: PollOptions,
    /// Offset of `deliver_at` from insertion; zero unless scheduled
    pub delay: Duration,
    /// Real-time wait after `delay` before polling; zero unless scheduled
    pub buffer: Duration,
}

impl ScenarioSpec {
    /// Fill unset fields from configuration
    pub fn resolve(&self, polling: &PollingConfig) -> Result<Scenario> {
        if self.name.trim().is_empty() {
            return Err(Error::ScenarioParse("scenario name must not be empty".into()));
        }
        if self.interval_ms == Some(0) || self.timeout_secs == Some(0) {
            return Err(Error::ScenarioParse(format!(
                "scenario '{}': timeout and interval must be greater than 0",
                self.name
            )));
        }
        let scheduled = self.kind == ScenarioKind::Scheduled;
        if !scheduled && (self.delay_secs.is_some() || self.buffer_secs.is_some()) {
            return Err(Error::ScenarioParse(format!(
                "scenario '{}': delay_secs and buffer_secs only apply to scheduled scenarios",
                self.name
            )));
        }

        let timeout = match self.timeout_secs {
            Some(secs) => Duration::from_secs(secs),
            None if scheduled => polling.scheduled_timeout(),
            None => polling.timeout(),
        };
        let interval = self
            .interval_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| polling.interval());
        let (delay, buffer) = if scheduled {
            (
                Duration::from_secs(self.delay_secs.unwrap_or(polling.scheduled_delay_secs)),
                Duration::from_secs(self.buffer_secs.unwrap_or(polling.scheduled_buffer_secs)),
            )
        } else {
            (Duration::ZERO, Duration::ZERO)
        };
        for (field, duration) in [
            ("timeout_secs", timeout),
            ("interval_ms", interval),
            ("delay_secs", delay),
            ("buffer_secs", buffer),
        ] {
            check_wait(field, duration).map_err(|msg| {
                Error::ScenarioParse(format!("scenario '{}': {}", self.name, msg))
            })?;
        }
        let (title, body) = default_content(self.kind);

        Ok(Scenario {
            name: self.name.clone(),
            kind: self.kind,
            title: self.title.clone().unwrap_or_else(|| title.to_string()),
            body: self.body.clone().unwrap_or_else(|| body.to_string()),
            category: self.category.clone(),
            priority: self.priority.clone(),
            poll: PollOptions::new(timeout, interval),
            delay,
            buffer,
        })
    }
}

fn default_content(kind: ScenarioKind) -> (&'static str, &'static str) {
    match kind {
        ScenarioKind::Immediate => ("E2E Test", "Instant delivery test"),
        ScenarioKind::Scheduled => ("E2E Scheduled", "From the future"),
        ScenarioKind::Broadcast => ("E2E Broadcast", "Testing global reach"),
    }
}

impl Scenario {
    /// Build a fresh record for this scenario; every call gets a new id
    pub fn build_record(&self, now: DateTime<Utc>) -> Result<NewNotification> {
        let record = match self.kind {
            ScenarioKind::Immediate => NewNotification::immediate(&self.title, &self.body),
            ScenarioKind::Scheduled => {
                let deliver_at = chrono::Duration::from_std(self.delay)
                    .ok()
                    .and_then(|delay| now.checked_add_signed(delay))
                    .ok_or_else(|| {
                        Error::ScenarioParse(format!(
                            "scenario '{}': delay of {:?} is out of range",
                            self.name, self.delay
                        ))
                    })?;
                NewNotification::scheduled(&self.title, &self.body, deliver_at)
            }
            ScenarioKind::Broadcast => NewNotification::broadcast(&self.title, &self.body),
        };
        Ok(record
            .with_category(&self.category)
            .with_priority(self.priority.clone()))
    }

    /// Longest this scenario can take, excluding store latency
    pub fn budget(&self) -> Duration {
        self.delay
            .saturating_add(self.buffer)
            .saturating_add(self.poll.budget())
    }
}

/// The three literal scenarios: immediate, scheduled, broadcast
pub fn builtin_specs() -> Vec<ScenarioSpec> {
    let spec = |name: &str, kind| ScenarioSpec {
        name: name.to_string(),
        kind,
        title: None,
        body: None,
        category: default_category(),
        priority: None,
        delay_secs: None,
        buffer_secs: None,
        timeout_secs: None,
        interval_ms: None,
    };
    vec![
        ScenarioSpec {
            priority: Some("high".to_string()),
            ..spec("Instant Notification Delivery", ScenarioKind::Immediate)
        },
        spec("Scheduled Notification", ScenarioKind::Scheduled),
        spec("Global Broadcast", ScenarioKind::Broadcast),
    ]
}

/// Load scenario specs from a YAML file
pub fn load_specs(path: &Path) -> Result<Vec<ScenarioSpec>> {
    let content = std::fs::read_to_string(path).map_err(|e| Error::file_read(path, e))?;
    parse_specs(&content)
}

/// Parse scenario specs from YAML text
pub fn parse_specs(content: &str) -> Result<Vec<ScenarioSpec>> {
    let file: ScenarioFile =
        serde_yaml::from_str(content).map_err(|e| Error::ScenarioParse(e.to_string()))?;
    if file.scenarios.is_empty() {
        return Err(Error::ScenarioParse("no scenarios defined".into()));
    }
    Ok(file.scenarios)
}

/// Resolve specs, keeping only names in `only` when it is non-empty
pub fn resolve_all(
    specs: &[ScenarioSpec],
    polling: &PollingConfig,
    only: &[String],
) -> Result<Vec<Scenario>> {
    let selected: Vec<&ScenarioSpec> = specs
        .iter()
        .filter(|s| only.is_empty() || only.iter().any(|o| o.eq_ignore_ascii_case(&s.name)))
        .collect();
    if selected.is_empty() {
        let available: Vec<&str> = specs.iter().map(|s| s.name.as_str()).collect();
        return Err(Error::Config(format!(
            "No scenario matches {:?}. Available: {:?}",
            only, available
        )));
    }
    selected.into_iter().map(|s| s.resolve(polling)).collect()
}
