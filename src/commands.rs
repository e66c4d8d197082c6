//! CLI argument definitions
//!
//! The harness has a single invocation; every flag is optional and only
//! overrides configuration.

use clap::Args;
use std::path::PathBuf;

#[derive(Args, Debug, Default, Clone)]
pub struct RunArgs {
    /// Configuration file (default: platform config dir/config.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Postgres URL of the shared store (overrides config and DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Schema-qualified notification table
    #[arg(long)]
    pub table: Option<String>,

    /// YAML file replacing the built-in scenarios
    #[arg(long)]
    pub scenarios: Option<PathBuf>,

    /// Run only the named scenario (repeatable, case-insensitive)
    #[arg(long = "only", value_name = "NAME")]
    pub only: Vec<String>,

    /// Run scenarios concurrently instead of one after another
    #[arg(long)]
    pub concurrent: bool,

    /// Print the summary as JSON instead of the console report
    #[arg(long)]
    pub json: bool,

    /// Debug-level logging
    #[arg(long, short)]
    pub verbose: bool,

    /// Also write logs to a file (default location if no path is given)
    #[arg(long, value_name = "PATH", num_args = 0..=1)]
    pub log_file: Option<Option<PathBuf>>,
}
