//! Batchtrack CLI
//!
//! Command-line interface for submitting batch jobs and tracking them
//! after submission.

mod commands;
mod config;
mod shutdown;

use clap::Parser;
use clap::error::ErrorKind;
use colored::*;
use commands::{Commands, handle_command};
use config::{Config, GlobalArgs};
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use batchtrack_tracker::TrackerError;

#[derive(Parser)]
#[command(name = "batchtrack")]
#[command(about = "Submit and track batch cluster jobs", long_about = None)]
#[command(version)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::FAILURE,
            };
        }
    };

    // Diagnostics go to stderr so command output stays machine readable
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "batchtrack=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let result = match Config::load(cli.global).await {
        Ok(config) => handle_command(cli.command, &config).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report(&e);
            ExitCode::FAILURE
        }
    }
}

fn report(err: &anyhow::Error) {
    match err.downcast_ref::<TrackerError>() {
        Some(tracker_err) if tracker_err.is_user_visible() => {
            eprintln!("{} {}", "error:".red().bold(), tracker_err);
        }
        _ => eprintln!("{} {:#}", "error:".red().bold(), err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["batchtrack", "list", "-n", "5", "--no-status"]).unwrap();
        assert!(cli.global.no_status);
        assert!(matches!(cli.command, Commands::List { limit: Some(5), .. }));
    }

    #[test]
    fn test_usage_errors() {
        let missing = Cli::try_parse_from(["batchtrack", "logs"]).err().unwrap();
        assert_eq!(missing.kind(), ErrorKind::MissingRequiredArgument);

        let unknown = Cli::try_parse_from(["batchtrack", "frobnicate"]).err().unwrap();
        assert_eq!(unknown.kind(), ErrorKind::InvalidSubcommand);

        let help = Cli::try_parse_from(["batchtrack", "--help"]).err().unwrap();
        assert_eq!(help.kind(), ErrorKind::DisplayHelp);
    }
}
