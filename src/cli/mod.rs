//! Run driver
//!
//! Resolves configuration and scenarios, opens the store, runs everything,
//! and prints the report. The store is closed on every exit path.

use std::path::PathBuf;

use tracing::{debug, error};

use crate::commands::RunArgs;
use crate::common::config::Config;
use crate::common::{logging, Error, Result};
use crate::harness::report::{decorate, Reporter, Status};
use crate::harness::runner::{run_all, RunOptions};
use crate::harness::scenario::{self, Scenario};
use crate::store::{NotificationStore, PgStore};

const RULE: &str = "════════════════════════════════════════════════════════════";

/// Build the effective configuration: file, then environment, then flags
pub fn load_config(args: &RunArgs) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::load()?,
    };
    config.apply_env();

    if let Some(url) = &args.database_url {
        config.database.url = url.clone();
    }
    if let Some(table) = &args.table {
        config.database.table = table.clone();
    }
    if args.concurrent {
        config.run.concurrent = true;
    }
    config.validate()?;
    Ok(config)
}

/// Log file requested by flag or configuration, if any
pub fn log_path(args: &RunArgs, config: &Config) -> Option<PathBuf> {
    match &args.log_file {
        Some(Some(path)) => Some(path.clone()),
        Some(None) => logging::default_log_path(),
        None => config.logging.file.clone(),
    }
}

/// Resolve the scenarios to run from the built-in set or a YAML file
pub fn load_scenarios(args: &RunArgs, config: &Config) -> Result<Vec<Scenario>> {
    let specs = match &args.scenarios {
        Some(path) => scenario::load_specs(path)?,
        None => scenario::builtin_specs(),
    };
    scenario::resolve_all(&specs, &config.polling, &args.only)
}

/// Connect to the configured store and run every scenario
pub async fn run(args: &RunArgs, config: &Config) -> Result<Reporter> {
    let scenarios = load_scenarios(args, config)?;
    let options = RunOptions {
        concurrent: config.run.concurrent,
        grace: std::time::Duration::from_secs(config.run.run_timeout_grace_secs),
    };

    let store = PgStore::connect(&config.database).await?;
    execute(&store, &scenarios, &options, args.json).await
}

/// Run scenarios against an open store, then close it whatever the outcome
///
/// Each scenario line is printed as soon as it resolves. When the run aborts,
/// the scenarios that already resolved are still summarized before the error
/// is returned.
pub async fn execute<S>(
    store: &S,
    scenarios: &[Scenario],
    options: &RunOptions,
    json: bool,
) -> Result<Reporter>
where
    S: NotificationStore + ?Sized,
{
    if !json {
        println!("{}", decorate(Status::Header, RULE));
        println!(
            "{}",
            decorate(Status::Header, "  NOTIFICATIONS SERVICE - END-TO-END TEST SUITE")
        );
        println!("{}", decorate(Status::Header, RULE));
    }

    let mut reporter = Reporter::new();
    let run = run_all(store, scenarios, options, |result| {
        let line = reporter.record(result);
        if !json {
            println!("{}", line);
        }
    })
    .await;
    store.close().await;

    let aborted = run.is_err();
    if json {
        let summary = if aborted {
            reporter.aborted_summary()
        } else {
            reporter.summary()
        };
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("{}", decorate(Status::Header, RULE));
        if aborted {
            println!("{}", reporter.aborted_line(scenarios.len()));
        } else {
            println!("{}", reporter.summary_line());
        }
    }

    if let Err(e) = run {
        error!(
            error = %e,
            resolved = reporter.results().len(),
            total = scenarios.len(),
            "Run aborted"
        );
        return Err(e);
    }
    debug!(passed = reporter.summarize(), "Run complete");

    Ok(reporter)
}

/// Map a fatal error to a short console message
pub fn describe_fatal(e: &Error) -> String {
    decorate(Status::Fail, &format!("Error: {e}"))
}
