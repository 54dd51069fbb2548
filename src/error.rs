//! Error types for the integration runner.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Configuration problems. Always fatal, raised before any container starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("Error getting config file at {}: {reason}", .path.display())]
    Read {
        /// Path that was read.
        path: PathBuf,
        /// Underlying I/O failure.
        reason: String,
    },

    /// The YAML document could not be parsed.
    #[error("Error parsing yaml config file at {}: {reason}", .path.display())]
    Parse {
        /// Path of the document.
        path: PathBuf,
        /// Parser message.
        reason: String,
    },

    /// Two fields that cannot be combined were both set.
    #[error("Error in {entry}: {first} and {second} are mutually exclusive")]
    MutuallyExclusive {
        /// Label of the offending entry.
        entry: String,
        /// First field name.
        first: &'static str,
        /// Second field name.
        second: &'static str,
    },

    /// An environment variable held a value of the wrong shape.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// What was wrong with it.
        message: String,
    },
}

/// Failures talking to the container runtime.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Docker could not be reached.
    #[error("Docker not available: {reason}")]
    DockerNotAvailable {
        /// Reason why Docker is unavailable.
        reason: String,
    },

    /// A CLI command could not be spawned or exited non-zero.
    #[error("{command} errored: {reason}")]
    Command {
        /// Full command line.
        command: String,
        /// Exit status or spawn failure.
        reason: String,
    },

    /// A Docker API call failed.
    #[error("Docker API call '{operation}' failed: {reason}")]
    Api {
        /// Which call failed.
        operation: String,
        /// Reason for failure.
        reason: String,
    },

    /// Failed to pull an image.
    #[error("Failed to pull image '{image}': {reason}")]
    ImagePullFailed {
        /// Image name.
        image: String,
        /// Reason for failure.
        reason: String,
    },

    /// A container never reported an address.
    #[error("No IP address reported for container '{container}' after {attempts} attempts")]
    AddressUnavailable {
        /// Container name or id.
        container: String,
        /// Inspect attempts made.
        attempts: u32,
    },
}

/// Readiness probing failures.
#[derive(Debug, Error)]
pub enum ReadinessError {
    /// A target was declared without any address to probe.
    #[error("readiness target '{target}' has no candidate addresses")]
    NoCandidates {
        /// Target name.
        target: String,
    },

    /// A target's prober exhausted its attempt budget.
    #[error(
        "'{target}': maximum attempts ({attempts}) with no hosts reachable [{}]",
        render_statuses(.statuses)
    )]
    Timeout {
        /// Target that failed.
        target: String,
        /// Attempt budget per candidate.
        attempts: u32,
        /// Open/closed status of every target at the time of failure.
        statuses: BTreeMap<String, bool>,
    },

    /// The optional overall deadline elapsed.
    #[error("readiness deadline of {deadline:?} elapsed [{}]", render_statuses(.statuses))]
    Deadline {
        /// Configured deadline.
        deadline: Duration,
        /// Open/closed status of every target when the deadline hit.
        statuses: BTreeMap<String, bool>,
    },
}

fn render_statuses(statuses: &BTreeMap<String, bool>) -> String {
    statuses
        .iter()
        .map(|(name, open)| format!("{}: {}", name, if *open { "open" } else { "closed" }))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Errors that abort a backend group.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Readiness(#[from] ReadinessError),

    /// A new group was started while another backend was still registered.
    #[error("backend '{active}' is still running; refusing to start '{requested}'")]
    BackendStillRunning {
        /// Backend that was never torn down.
        active: String,
        /// Backend that tried to start.
        requested: String,
    },
}

/// Result type for lifecycle operations.
pub type Result<T> = std::result::Result<T, LifecycleError>;
