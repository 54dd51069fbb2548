//! CLI command handling.
//!
//! Provides subcommands for:
//! - Running the backend × tester matrix (`run`, the default)
//! - Printing the matrix a config file describes (`plan`)
//! - Checking Docker prerequisites (`doctor`)
//! - Generating shell completions (`completion`)

mod completion;
mod doctor;
mod plan;
mod run;

pub use completion::Completion;
pub use doctor::run_doctor_command;
pub use plan::{render_plan, run_plan_command};
pub use run::run_matrix_command;

use std::path::PathBuf;

use clap::{ColorChoice, Parser, Subcommand};
use tracing_subscriber::filter::LevelFilter;

use crate::config::DEFAULT_CONFIG_FILE;

#[derive(Parser, Debug)]
#[command(name = "tupelo-integration")]
#[command(about = "Run integration test suites in Docker against Tupelo backends")]
#[command(
    long_about = "Brings up each configured Tupelo backend, waits for it to accept connections, runs every tester container against it and tears it down.\nExamples:\n  tupelo-integration run  # Run the matrix from .tupelo-integration.yml\n  tupelo-integration plan -c ci.yml  # Show what would run"
)]
#[command(version)]
#[command(color = ColorChoice::Auto)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Log level used when RUST_LOG is unset
    #[arg(short = 'L', long, global = true, default_value = "warn", value_parser = parse_log_level)]
    pub log_level: LevelFilter,
}

fn parse_log_level(value: &str) -> Result<LevelFilter, String> {
    match value.to_ascii_lowercase().as_str() {
        "trace" => Ok(LevelFilter::TRACE),
        "debug" => Ok(LevelFilter::DEBUG),
        "info" => Ok(LevelFilter::INFO),
        "warn" => Ok(LevelFilter::WARN),
        "error" => Ok(LevelFilter::ERROR),
        "off" => Ok(LevelFilter::OFF),
        _ => Err("expected one of trace, debug, info, warn, error, off".to_string()),
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the matrix (default if no subcommand given)
    #[command(
        about = "Run every tester against every backend",
        long_about = "Runs the matrix described by the config file.\nExample: tupelo-integration run -c .tupelo-integration.yml"
    )]
    Run {
        /// Run matrix configuration file
        #[arg(short = 'c', long, default_value = DEFAULT_CONFIG_FILE)]
        config_file: PathBuf,
    },

    /// Show the matrix without touching Docker
    #[command(
        about = "Print the run matrix",
        long_about = "Loads and validates the config file and prints each backend with its testers.\nExample: tupelo-integration plan --json"
    )]
    Plan {
        /// Run matrix configuration file
        #[arg(short = 'c', long, default_value = DEFAULT_CONFIG_FILE)]
        config_file: PathBuf,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check that Docker is usable
    #[command(
        about = "Run diagnostics",
        long_about = "Checks the docker and docker-compose binaries and the Docker daemon.\nExample: tupelo-integration doctor"
    )]
    Doctor,

    /// Generate shell completion scripts
    #[command(
        about = "Generate completions",
        long_about = "Generates shell completion scripts.\nExample: tupelo-integration completion --shell bash > tupelo-integration.bash"
    )]
    Completion(Completion),
}

impl Cli {
    /// Config file of the `run` command, the default when no subcommand is
    /// given. `None` for the other commands.
    pub fn run_config_file(&self) -> Option<PathBuf> {
        match &self.command {
            None => Some(PathBuf::from(DEFAULT_CONFIG_FILE)),
            Some(Command::Run { config_file }) => Some(config_file.clone()),
            Some(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_version() {
        let cmd = Cli::command();
        assert_eq!(
            cmd.get_version().unwrap_or("unknown"),
            env!("CARGO_PKG_VERSION")
        );
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_no_subcommand_runs_default_config() {
        let cli = Cli::try_parse_from(["tupelo-integration"]).unwrap();
        assert_eq!(
            cli.run_config_file(),
            Some(PathBuf::from(".tupelo-integration.yml"))
        );
        assert_eq!(cli.log_level, LevelFilter::WARN);
    }

    #[test]
    fn test_run_with_config_file_and_log_level() {
        let cli =
            Cli::try_parse_from(["tupelo-integration", "run", "-c", "ci.yml", "-L", "debug"])
                .unwrap();
        assert_eq!(cli.run_config_file(), Some(PathBuf::from("ci.yml")));
        assert_eq!(cli.log_level, LevelFilter::DEBUG);
    }

    #[test]
    fn test_unknown_log_level_is_rejected() {
        let err = Cli::try_parse_from(["tupelo-integration", "-L", "verbose"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
        assert!(err.to_string().contains("expected one of trace, debug, info, warn, error, off"));

        let cli = Cli::try_parse_from(["tupelo-integration", "-L", "INFO"]).unwrap();
        assert_eq!(cli.log_level, LevelFilter::INFO);
    }

    #[test]
    fn test_plan_is_not_a_run() {
        let cli = Cli::try_parse_from(["tupelo-integration", "plan", "--json"]).unwrap();
        assert_eq!(cli.run_config_file(), None);
        assert!(matches!(cli.command, Some(Command::Plan { json: true, .. })));
    }
}
