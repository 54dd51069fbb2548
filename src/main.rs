//! Tupelo integration runner - main entry point.

use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use tupelo_integration::cli::{
    Cli, Command, run_doctor_command, run_matrix_command, run_plan_command,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load .env if present
    let _ = dotenvy::dotenv();

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level.to_string()));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    match &cli.command {
        Some(Command::Plan { config_file, json }) => return run_plan_command(config_file, *json),
        Some(Command::Doctor) => return run_doctor_command().await,
        Some(Command::Completion(completion)) => return completion.run(),
        None | Some(Command::Run { .. }) => {}
    }

    let Some(config_file) = cli.run_config_file() else {
        return Ok(());
    };

    let code = run_matrix_command(&config_file).await?;
    std::process::exit(code);
}
