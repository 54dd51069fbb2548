//! `run`: drive the matrix against the local Docker daemon.

use std::path::Path;
use std::sync::Arc;

use crate::config::{Settings, load_config};
use crate::engine::{DockerEngine, check_docker};
use crate::lifecycle::StackLifecycleManager;
use crate::matrix::RunMatrix;
use crate::readiness::{DotProgress, Prober, ReadinessCoordinator, TcpDialer};

/// Run the matrix in `config_file` and return the process exit code.
///
/// Configuration and preflight failures are returned as errors before any
/// backend starts.
pub async fn run_matrix_command(config_file: &Path) -> anyhow::Result<i32> {
    let settings = Settings::from_env()?;
    let config = load_config(config_file)?;
    config.validate()?;

    let detection = check_docker(&settings).await;
    if !detection.status.is_ready() {
        if let Some(remedy) = detection.remedy() {
            eprintln!("{}", remedy);
        }
        anyhow::bail!("Docker is {}", detection.status);
    }

    let engine = Arc::new(DockerEngine::connect(&settings).await?);
    let prober = Prober::new(Arc::new(TcpDialer), Arc::new(DotProgress), settings.probe);
    let coordinator = ReadinessCoordinator::new(prober).with_deadline(settings.ready_deadline);
    let manager = StackLifecycleManager::new(engine, coordinator, settings);

    let mut matrix = RunMatrix::new(manager);
    let report = matrix.run_all(config.backends, &config.testers).await?;

    println!();
    println!("{}", report.summary());

    let code = report.exit_code();
    tracing::info!("Matrix finished with exit code {}", code);
    Ok(code)
}
