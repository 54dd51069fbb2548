//! Container runtime access.
//!
//! The orchestrator only talks to containers through [`ContainerEngine`].
//! [`DockerEngine`] is the production implementation; tests use
//! [`crate::testing::FakeEngine`].

pub mod detect;
pub mod docker;

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;

use crate::error::EngineError;

pub use detect::{DockerDetection, DockerStatus, check_docker};
pub use docker::DockerEngine;

/// What to run: image, arguments, environment and network.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSpec {
    pub image: String,
    pub command: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub network: Option<String>,
}

impl RunSpec {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            ..Default::default()
        }
    }

    pub fn with_command(mut self, command: Vec<String>) -> Self {
        self.command = command;
        self
    }

    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }

    pub fn with_network(mut self, network: Option<String>) -> Self {
        self.network = network;
        self
    }

    /// Environment in `KEY=value` form.
    pub fn env_pairs(&self) -> Vec<String> {
        self.env.iter().map(|(k, v)| format!("{}={}", k, v)).collect()
    }

    /// `docker run` arguments. Daemon runs detach; everything else is removed
    /// on exit.
    pub fn docker_run_args(&self, daemon: bool) -> Vec<String> {
        let mut args = vec!["run".to_string()];
        args.push(if daemon { "-d" } else { "--rm" }.to_string());

        for pair in self.env_pairs() {
            args.push("-e".to_string());
            args.push(pair);
        }

        if let Some(network) = self.network.as_ref().filter(|n| !n.is_empty()) {
            args.push("--net".to_string());
            args.push(network.clone());
        }

        args.push(self.image.clone());
        args.extend(self.command.iter().cloned());
        args
    }
}

/// Operations the orchestrator needs from a container runtime.
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Build an image from `context`, returning its id.
    async fn build(&self, context: &Path) -> Result<String, EngineError>;

    /// Refresh `image` from its registry.
    async fn pull(&self, image: &str) -> Result<(), EngineError>;

    /// Create a detached container without starting it, returning its id.
    async fn create_daemon(&self, spec: &RunSpec) -> Result<String, EngineError>;

    /// Start a container made by [`create_daemon`](Self::create_daemon).
    async fn start_daemon(&self, container: &str) -> Result<(), EngineError>;

    /// Create and start a detached container, returning its id.
    ///
    /// A container that was created but would not start is removed before
    /// the start error is returned.
    async fn run_daemon(&self, spec: &RunSpec) -> Result<String, EngineError> {
        let id = self.create_daemon(spec).await?;
        if let Err(e) = self.start_daemon(&id).await {
            if let Err(remove_err) = self.remove(&id).await {
                tracing::warn!("Could not remove unstarted container {}: {}", id, remove_err);
            }
            return Err(e);
        }
        Ok(id)
    }

    /// Run a container to completion with output attached, returning its
    /// exit code.
    async fn run_foreground(&self, spec: &RunSpec) -> Result<i32, EngineError>;

    /// Run a throwaway container and capture its output.
    async fn run_capture(&self, spec: &RunSpec) -> Result<String, EngineError>;

    /// IP address of a container, `None` while it has none.
    async fn inspect_address(&self, container: &str) -> Result<Option<String>, EngineError>;

    /// Force-remove a container and its volumes.
    async fn remove(&self, container: &str) -> Result<(), EngineError>;

    /// Bring up the compose stack for `project`.
    async fn stack_up(&self, project: &str) -> Result<(), EngineError>;

    /// Tear down the compose stack for `project`.
    async fn stack_down(&self, project: &str) -> Result<(), EngineError>;
}
