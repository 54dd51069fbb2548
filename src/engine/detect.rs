//! Docker prerequisite checks.
//!
//! Before any backend is touched the runner verifies that the `docker`
//! binary is on PATH and that the daemon answers a ping. A missing
//! `docker-compose` binary is only a warning: single-container backends still
//! work, stack backends will not.

use std::fmt;

use crate::config::Settings;

/// Whether backends can be started at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DockerStatus {
    Ready,
    /// The configured docker binary is not on PATH.
    BinaryMissing,
    /// The binary exists but the daemon did not answer.
    DaemonUnreachable,
}

impl DockerStatus {
    pub fn is_ready(self) -> bool {
        self == DockerStatus::Ready
    }
}

impl fmt::Display for DockerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DockerStatus::Ready => "ready",
            DockerStatus::BinaryMissing => "not installed",
            DockerStatus::DaemonUnreachable => "not responding",
        })
    }
}

/// Outcome of [`check_docker`].
#[derive(Debug, Clone)]
pub struct DockerDetection {
    pub status: DockerStatus,
    /// Whether the compose binary is on PATH.
    pub compose_installed: bool,
    /// Docker binary that was looked up.
    pub docker_bin: String,
}

impl DockerDetection {
    /// What to do before the matrix can run, `None` when Docker is ready.
    pub fn remedy(&self) -> Option<String> {
        match self.status {
            DockerStatus::Ready => None,
            DockerStatus::BinaryMissing => Some(format!(
                "Put {} on PATH or set DOCKER_BIN to its location (https://docs.docker.com/get-docker/)",
                self.docker_bin
            )),
            DockerStatus::DaemonUnreachable => Some(
                "Start the Docker daemon or point DOCKER_HOST at one that is running".to_string(),
            ),
        }
    }
}

/// Check whether Docker is installed and running.
///
/// The compose binary is looked up first so its warning is logged even when
/// the docker check fails.
pub async fn check_docker(settings: &Settings) -> DockerDetection {
    let compose_installed = binary_exists(&settings.compose_bin);

    if !compose_installed {
        tracing::warn!("Could not find {} command", settings.compose_bin);
        tracing::warn!("docker-compose builds will not work");
    }

    let status = if !binary_exists(&settings.docker_bin) {
        DockerStatus::BinaryMissing
    } else {
        match crate::engine::docker::connect_docker().await {
            Ok(_) => DockerStatus::Ready,
            Err(e) => {
                tracing::error!("docker daemon check failed: {}", e);
                DockerStatus::DaemonUnreachable
            }
        }
    };

    DockerDetection {
        status,
        compose_installed,
        docker_bin: settings.docker_bin.clone(),
    }
}

/// Check if `bin` exists on PATH.
fn binary_exists(bin: &str) -> bool {
    #[cfg(unix)]
    let finder = "which";
    #[cfg(windows)]
    let finder = "where";

    std::process::Command::new(finder)
        .arg(bin)
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .is_ok_and(|s| s.success())
}
