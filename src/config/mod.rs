//! Runtime settings and the YAML run-matrix loader.
//!
//! Tunables come from the environment (a `.env` file is honoured by the
//! binary). The matrix of backends and testers comes from the YAML document,
//! see [`loader`].

pub(crate) mod helpers;
pub mod loader;

use std::time::Duration;

use crate::config::helpers::{optional_env, parse_optional_env};
use crate::error::ConfigError;

pub use loader::{RunConfig, load_config, parse_config};

/// Port the backend's RPC server listens on.
pub const RPC_PORT: u16 = 50051;

/// Port the stack's bootstrap node listens on.
pub const BOOTSTRAP_PORT: u16 = 34001;

/// Peer id of the bootstrap node baked into the stack images.
pub const BOOTSTRAP_PEER_ID: &str = "16Uiu2HAm3TGSEKEjagcCojSJeaT5rypaeJMKejijvYSnAjviWwV5";

/// Default configuration file name, relative to the working directory.
pub const DEFAULT_CONFIG_FILE: &str = ".tupelo-integration.yml";

/// Per-target probing budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeSettings {
    /// Attempts per candidate address before giving up.
    pub max_attempts: u32,
    /// Connection timeout of a single attempt.
    pub per_attempt_timeout: Duration,
    /// Pause between unsuccessful attempts on one candidate.
    pub delay_between_attempts: Duration,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            max_attempts: 500,
            per_attempt_timeout: Duration::from_secs(1),
            delay_between_attempts: Duration::from_millis(500),
        }
    }
}

/// Compose stack naming.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackSettings {
    /// Compose project name passed with `-p`.
    pub project: String,
    /// Container name of the bootstrap node.
    pub bootstrap_container: String,
    /// Container name of the RPC server.
    pub rpc_container: String,
}

impl Default for StackSettings {
    fn default() -> Self {
        Self {
            project: "tupelo".to_string(),
            bootstrap_container: "bootstrap".to_string(),
            rpc_container: "rpc-server".to_string(),
        }
    }
}

impl StackSettings {
    /// Default network compose creates for the project.
    pub fn network(&self) -> String {
        format!("{}_default", self.project)
    }
}

/// Everything the orchestrator needs besides the run matrix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Address the Docker daemon publishes container ports on.
    pub docker_host: String,
    pub probe: ProbeSettings,
    /// Optional wall-clock bound over all readiness targets.
    pub ready_deadline: Option<Duration>,
    /// Attempts when waiting for a new container to get an address.
    pub inspect_attempts: u32,
    /// Pause between those attempts.
    pub inspect_delay: Duration,
    pub stack: StackSettings,
    /// Docker CLI binary.
    pub docker_bin: String,
    /// Compose CLI binary.
    pub compose_bin: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            docker_host: "127.0.0.1".to_string(),
            probe: ProbeSettings::default(),
            ready_deadline: None,
            inspect_attempts: 100,
            inspect_delay: Duration::from_secs(5),
            stack: StackSettings::default(),
            docker_bin: "docker".to_string(),
            compose_bin: "docker-compose".to_string(),
        }
    }
}

impl Settings {
    /// Resolve settings from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let docker_host = match optional_env("DOCKER_HOST")? {
            Some(raw) => docker_host_ip(&raw)?,
            None => defaults.docker_host,
        };

        let probe = ProbeSettings {
            max_attempts: parse_optional_env(
                "TUPELO_PROBE_MAX_ATTEMPTS",
                defaults.probe.max_attempts,
            )?,
            per_attempt_timeout: Duration::from_millis(parse_optional_env(
                "TUPELO_PROBE_TIMEOUT_MS",
                defaults.probe.per_attempt_timeout.as_millis() as u64,
            )?),
            delay_between_attempts: Duration::from_millis(parse_optional_env(
                "TUPELO_PROBE_DELAY_MS",
                defaults.probe.delay_between_attempts.as_millis() as u64,
            )?),
        };

        if probe.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                key: "TUPELO_PROBE_MAX_ATTEMPTS".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        let ready_deadline = optional_env("TUPELO_READY_DEADLINE_SECS")?
            .map(|s| s.parse::<u64>())
            .transpose()
            .map_err(|e| ConfigError::InvalidValue {
                key: "TUPELO_READY_DEADLINE_SECS".to_string(),
                message: format!("must be a number of seconds: {e}"),
            })?
            .map(Duration::from_secs);

        Ok(Self {
            docker_host,
            probe,
            ready_deadline,
            inspect_attempts: parse_optional_env(
                "TUPELO_INSPECT_ATTEMPTS",
                defaults.inspect_attempts,
            )?,
            inspect_delay: Duration::from_secs(parse_optional_env(
                "TUPELO_INSPECT_DELAY_SECS",
                defaults.inspect_delay.as_secs(),
            )?),
            stack: StackSettings {
                project: optional_env("TUPELO_COMPOSE_PROJECT")?
                    .unwrap_or(defaults.stack.project),
                ..defaults.stack
            },
            docker_bin: optional_env("DOCKER_BIN")?.unwrap_or(defaults.docker_bin),
            compose_bin: optional_env("DOCKER_COMPOSE_BIN")?.unwrap_or(defaults.compose_bin),
        })
    }
}

/// Host part of a `DOCKER_HOST` URL.
///
/// Socket URLs carry no host; those fall back to loopback.
pub fn docker_host_ip(raw: &str) -> Result<String, ConfigError> {
    let parsed = url::Url::parse(raw).map_err(|e| ConfigError::InvalidValue {
        key: "DOCKER_HOST".to_string(),
        message: format!("error parsing DOCKER_HOST URL: {e}"),
    })?;

    Ok(parsed
        .host_str()
        .filter(|h| !h.is_empty())
        .unwrap_or("127.0.0.1")
        .to_string())
}
