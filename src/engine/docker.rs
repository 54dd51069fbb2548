//! Docker implementation of [`ContainerEngine`].
//!
//! Daemon containers, pulls, inspection and removal go through the Docker API.
//! Builds, attached tester runs and compose stacks go through the CLI so their
//! output streams to the terminal the same way it would by hand.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use bollard::Docker;
use bollard::container::{
    Config, CreateContainerOptions, RemoveContainerOptions, StartContainerOptions,
};
use bollard::image::CreateImageOptions;
use bollard::models::HostConfig;
use futures::StreamExt;
use tokio::process::Command;

use crate::config::Settings;
use crate::engine::{ContainerEngine, RunSpec};
use crate::error::EngineError;

/// Connect to the local Docker daemon and check it responds.
pub async fn connect_docker() -> Result<Docker, EngineError> {
    let docker =
        Docker::connect_with_local_defaults().map_err(|e| EngineError::DockerNotAvailable {
            reason: e.to_string(),
        })?;

    docker
        .ping()
        .await
        .map_err(|e| EngineError::DockerNotAvailable {
            reason: e.to_string(),
        })?;

    Ok(docker)
}

fn command_line(bin: &str, args: &[String]) -> String {
    std::iter::once(bin.to_string())
        .chain(args.iter().cloned())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Run a command to completion and return its trimmed stdout.
async fn run_cmd(bin: &str, args: &[String]) -> Result<String, EngineError> {
    let line = command_line(bin, args);
    tracing::trace!("Running command {}", line);

    let output = Command::new(bin)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| EngineError::Command {
            command: line.clone(),
            reason: e.to_string(),
        })?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    tracing::trace!("{}{}", stdout, stderr);

    if !output.status.success() {
        let err = EngineError::Command {
            command: line,
            reason: format!("{}: {}", output.status, stderr.trim()),
        };
        tracing::error!("{}", err);
        return Err(err);
    }

    Ok(stdout.trim().to_string())
}

/// Run a command with inherited stdio and return its exit code.
async fn run_foreground_cmd(bin: &str, args: &[String]) -> Result<i32, EngineError> {
    let line = command_line(bin, args);
    tracing::trace!("Running command {}", line);

    let status = Command::new(bin)
        .args(args)
        .status()
        .await
        .map_err(|e| EngineError::Command {
            command: line.clone(),
            reason: e.to_string(),
        })?;

    // Killed by a signal: no code, count it as a failure.
    Ok(status.code().unwrap_or(1))
}

/// Talks to Docker through the API socket and the `docker`/`docker-compose`
/// binaries.
pub struct DockerEngine {
    docker: Docker,
    docker_bin: String,
    compose_bin: String,
}

impl DockerEngine {
    /// Connect to the daemon using the binaries named in `settings`.
    pub async fn connect(settings: &Settings) -> Result<Self, EngineError> {
        let docker = connect_docker().await?;
        Ok(Self {
            docker,
            docker_bin: settings.docker_bin.clone(),
            compose_bin: settings.compose_bin.clone(),
        })
    }

    fn compose_args(project: &str, rest: &[&str]) -> Vec<String> {
        ["-p", project]
            .iter()
            .chain(rest.iter())
            .map(|s| s.to_string())
            .collect()
    }
}

#[async_trait]
impl ContainerEngine for DockerEngine {
    async fn build(&self, context: &Path) -> Result<String, EngineError> {
        let build_path = std::path::absolute(context).map_err(|e| EngineError::Command {
            command: format!("{} build", self.docker_bin),
            reason: format!("error looking up build path {}: {}", context.display(), e),
        })?;

        println!("Building Docker image from {}", build_path.display());

        let args = vec![
            "build".to_string(),
            "-q".to_string(),
            build_path.display().to_string(),
        ];
        run_cmd(&self.docker_bin, &args).await
    }

    async fn pull(&self, image: &str) -> Result<(), EngineError> {
        println!("Pulling image {}", image);

        let options = CreateImageOptions {
            from_image: image.to_string(),
            ..Default::default()
        };

        let mut stream = self.docker.create_image(Some(options), None, None);

        while let Some(result) = stream.next().await {
            match result {
                Ok(info) => {
                    if let Some(status) = info.status {
                        tracing::trace!("Pull status: {}", status);
                    }
                }
                Err(e) => {
                    return Err(EngineError::ImagePullFailed {
                        image: image.to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        tracing::debug!("Pulled image: {}", image);
        Ok(())
    }

    async fn create_daemon(&self, spec: &RunSpec) -> Result<String, EngineError> {
        tracing::trace!("Creating container: {}", spec.docker_run_args(true).join(" "));

        let env = spec.env_pairs();
        let config = Config {
            image: Some(spec.image.clone()),
            cmd: if spec.command.is_empty() {
                None
            } else {
                Some(spec.command.clone())
            },
            env: if env.is_empty() { None } else { Some(env) },
            host_config: Some(HostConfig {
                network_mode: spec.network.clone(),
                ..Default::default()
            }),
            ..Default::default()
        };

        let response = self
            .docker
            .create_container(None::<CreateContainerOptions<String>>, config)
            .await
            .map_err(|e| EngineError::Api {
                operation: format!("create container from {}", spec.image),
                reason: e.to_string(),
            })?;

        tracing::debug!("Created container {} from {}", response.id, spec.image);
        Ok(response.id)
    }

    async fn start_daemon(&self, container: &str) -> Result<(), EngineError> {
        self.docker
            .start_container(container, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| EngineError::Api {
                operation: format!("start container {}", container),
                reason: e.to_string(),
            })?;

        tracing::info!("Started container {}", container);
        Ok(())
    }

    async fn run_foreground(&self, spec: &RunSpec) -> Result<i32, EngineError> {
        let args = spec.docker_run_args(false);
        println!("Running docker {:?}", args);
        run_foreground_cmd(&self.docker_bin, &args).await
    }

    async fn run_capture(&self, spec: &RunSpec) -> Result<String, EngineError> {
        run_cmd(&self.docker_bin, &spec.docker_run_args(false)).await
    }

    async fn inspect_address(&self, container: &str) -> Result<Option<String>, EngineError> {
        let info = match self.docker.inspect_container(container, None).await {
            Ok(info) => info,
            Err(e) => {
                // The container may not be visible yet right after start.
                tracing::trace!("Inspect of {} failed: {}", container, e);
                return Ok(None);
            }
        };

        let address = info.network_settings.and_then(|settings| {
            settings
                .networks
                .into_iter()
                .flat_map(|networks| networks.into_values())
                .filter_map(|endpoint| endpoint.ip_address)
                .find(|ip| !ip.is_empty())
        });

        Ok(address)
    }

    async fn remove(&self, container: &str) -> Result<(), EngineError> {
        self.docker
            .remove_container(
                container,
                Some(RemoveContainerOptions {
                    force: true,
                    v: true,
                    ..Default::default()
                }),
            )
            .await
            .map_err(|e| EngineError::Api {
                operation: format!("remove container {}", container),
                reason: e.to_string(),
            })
    }

    async fn stack_up(&self, project: &str) -> Result<(), EngineError> {
        let args = Self::compose_args(project, &["up", "-d", "--build", "--force-recreate"]);
        let code = run_foreground_cmd(&self.compose_bin, &args).await?;
        if code != 0 {
            return Err(EngineError::Command {
                command: command_line(&self.compose_bin, &args),
                reason: format!("exit code {}", code),
            });
        }
        Ok(())
    }

    async fn stack_down(&self, project: &str) -> Result<(), EngineError> {
        let args = Self::compose_args(project, &["down"]);
        run_cmd(&self.compose_bin, &args).await.map(|_| ())
    }
}
