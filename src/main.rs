//! Notification delivery E2E harness
//!
//! Inserts notification records, waits for the worker to process them, and
//! exits nonzero if any delivery policy was not honored.

use clap::Parser;
use notify_e2e::cli;
use notify_e2e::commands::RunArgs;
use notify_e2e::common::logging;
use notify_e2e::harness::report::EXIT_FATAL;

#[derive(Parser)]
#[command(name = "notify-e2e", about = "End-to-end checks for the notification worker")]
#[command(version, long_about = None)]
struct Cli {
    #[command(flatten)]
    args: RunArgs,
}

#[tokio::main]
async fn main() {
    let Cli { args } = Cli::parse();

    let config = match cli::load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", cli::describe_fatal(&e));
            std::process::exit(EXIT_FATAL);
        }
    };

    let log_file = cli::log_path(&args, &config);
    let guard = logging::init(args.verbose, log_file.as_deref());

    let code = match cli::run(&args, &config).await {
        Ok(reporter) => reporter.exit_code(),
        Err(e) => {
            eprintln!("{}", cli::describe_fatal(&e));
            EXIT_FATAL
        }
    };

    drop(guard);
    std::process::exit(code);
}
