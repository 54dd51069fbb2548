//! Backend and tester descriptions plus per-run results.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use crate::error::ConfigError;

/// Command a single-container backend runs when none is configured.
pub const DEFAULT_BACKEND_COMMAND: &[&str] = &["rpc-server"];

/// Build context used when an entry has neither an image nor a build path.
pub const DEFAULT_BUILD_PATH: &str = ".";

/// One backend variant under test.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BackendSpec {
    /// Human-readable name (empty for schema v1 entries).
    pub name: String,
    /// Directory to build the image from when `image` is unset.
    pub build: Option<PathBuf>,
    /// Image reference; filled in once the image is resolved.
    pub image: Option<String>,
    /// Command and arguments passed to the container.
    pub command: Vec<String>,
    /// Environment variables for the container.
    pub env: BTreeMap<String, String>,
    /// Launch as a multi-container compose stack instead of one container.
    pub stack: bool,
    /// Docker network, populated once known.
    pub network: Option<String>,
}

impl BackendSpec {
    /// Reject field combinations that cannot be launched.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stack && self.image.as_deref().is_some_and(|i| !i.is_empty()) {
            return Err(ConfigError::MutuallyExclusive {
                entry: self.to_string(),
                first: "docker-compose",
                second: "image",
            });
        }
        Ok(())
    }

    /// Command to launch, falling back to the default service process.
    pub fn launch_command(&self) -> Vec<String> {
        if self.command.is_empty() && !self.stack {
            DEFAULT_BACKEND_COMMAND.iter().map(|s| s.to_string()).collect()
        } else {
            self.command.clone()
        }
    }
}

impl fmt::Display for BackendSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_label(f, &self.name, self.image.as_deref(), self.build.as_ref())
    }
}

/// One tester variant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TesterSpec {
    pub name: String,
    pub build: Option<PathBuf>,
    pub image: Option<String>,
    pub command: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub network: Option<String>,
}

impl fmt::Display for TesterSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_label(f, &self.name, self.image.as_deref(), self.build.as_ref())
    }
}

fn write_label(
    f: &mut fmt::Formatter<'_>,
    name: &str,
    image: Option<&str>,
    build: Option<&PathBuf>,
) -> fmt::Result {
    if !name.is_empty() {
        return f.write_str(name);
    }
    if let Some(image) = image.filter(|i| !i.is_empty()) {
        return f.write_str(image);
    }
    match build {
        Some(path) => write!(f, "{}", path.display()),
        None => Ok(()),
    }
}

/// Outcome of one (backend, tester) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRecord {
    pub backend: BackendSpec,
    pub tester: TesterSpec,
    pub exit_code: i32,
}

impl RunRecord {
    pub fn passed(&self) -> bool {
        self.exit_code == 0
    }
}

impl fmt::Display for RunRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = if self.passed() {
            "PASS".to_string()
        } else {
            format!("FAIL (code {})", self.exit_code)
        };
        write!(f, "{:<16} {} x {}", status, self.backend, self.tester)
    }
}
