//! YAML run-matrix loader.
//!
//! Two document shapes have shipped over time:
//!
//! ```yaml
//! # v2: named backends and testers
//! tupelos:
//!   latest:
//!     image: quorumcontrol/tupelo:latest
//!   local:
//!     docker-compose: true
//! testers:
//!   js-sdk:
//!     build: .
//!     env:
//!       DEBUG: "true"
//! ```
//!
//! ```yaml
//! # v1: image strings and a single tester
//! tupeloImages:
//!   - quorumcontrol/tupelo:latest rpc-server -L debug
//! tester:
//!   build: .
//! ```
//!
//! Both collapse into [`RunConfig`]. The newest shape is tried first and older
//! shapes are used when it does not match.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_yml::{Mapping, Value};

use crate::error::ConfigError;
use crate::model::{BackendSpec, TesterSpec};

/// The normalized run matrix.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunConfig {
    pub backends: Vec<BackendSpec>,
    pub testers: Vec<TesterSpec>,
}

impl RunConfig {
    /// Validate every backend. Runs before any engine call.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.backends.iter().try_for_each(BackendSpec::validate)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct EntryDocument {
    name: String,
    build: Option<String>,
    image: Option<String>,
    command: Vec<String>,
    env: BTreeMap<String, String>,
    #[serde(rename = "docker-compose")]
    docker_compose: bool,
    network: Option<String>,
}

impl EntryDocument {
    fn into_backend(self, name: String) -> BackendSpec {
        BackendSpec {
            name,
            build: non_empty(self.build).map(PathBuf::from),
            image: non_empty(self.image),
            command: self.command,
            env: self.env,
            stack: self.docker_compose,
            network: non_empty(self.network),
        }
    }

    fn into_tester(self, name: String) -> TesterSpec {
        TesterSpec {
            name,
            build: non_empty(self.build).map(PathBuf::from),
            image: non_empty(self.image),
            command: self.command,
            env: self.env,
            network: non_empty(self.network),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DocumentV2 {
    tupelos: Mapping,
    testers: Mapping,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DocumentV1 {
    #[serde(rename = "tupeloImages")]
    tupelo_images: Vec<String>,
    tester: EntryDocument,
}

enum ConfigShape {
    V2(DocumentV2),
    V1(DocumentV1),
}

impl ConfigShape {
    fn detect(doc: Value) -> Result<Self, serde_yml::Error> {
        if doc.is_null() {
            return Ok(ConfigShape::V1(DocumentV1::default()));
        }

        if let Ok(v2) = serde_yml::from_value::<DocumentV2>(doc.clone())
            && !v2.tupelos.is_empty()
        {
            return Ok(ConfigShape::V2(v2));
        }

        serde_yml::from_value::<DocumentV1>(doc).map(ConfigShape::V1)
    }

    fn normalize(self) -> Result<RunConfig, serde_yml::Error> {
        match self {
            ConfigShape::V2(doc) => Ok(RunConfig {
                backends: named_entries(doc.tupelos)?
                    .into_iter()
                    .map(|(name, entry)| entry.into_backend(name))
                    .collect(),
                testers: named_entries(doc.testers)?
                    .into_iter()
                    .map(|(name, entry)| entry.into_tester(name))
                    .collect(),
            }),
            ConfigShape::V1(doc) => {
                let backends = doc
                    .tupelo_images
                    .iter()
                    .filter_map(|line| {
                        let mut parts = line.split_whitespace().map(str::to_string);
                        let image = parts.next()?;
                        Some(BackendSpec {
                            image: Some(image),
                            command: parts.collect(),
                            ..Default::default()
                        })
                    })
                    .collect();
                let name = doc.tester.name.clone();
                Ok(RunConfig {
                    backends,
                    testers: vec![doc.tester.into_tester(name)],
                })
            }
        }
    }
}

/// Entries of a name → entry mapping, in declaration order.
fn named_entries(mapping: Mapping) -> Result<Vec<(String, EntryDocument)>, serde_yml::Error> {
    mapping
        .into_iter()
        .map(|(key, value)| {
            let name = match key {
                Value::String(s) => s,
                other => serde_yml::to_string(&other)?.trim().to_string(),
            };
            let entry = if value.is_null() {
                EntryDocument::default()
            } else {
                serde_yml::from_value(value)?
            };
            Ok((name, entry))
        })
        .collect()
}

/// Parse a YAML document. `origin` is only used in error messages.
pub fn parse_config(contents: &str, origin: &Path) -> Result<RunConfig, ConfigError> {
    let parse_err = |e: serde_yml::Error| ConfigError::Parse {
        path: origin.to_path_buf(),
        reason: e.to_string(),
    };

    let doc: Value = serde_yml::from_str(contents).map_err(parse_err)?;
    let config = ConfigShape::detect(doc)
        .and_then(ConfigShape::normalize)
        .map_err(parse_err)?;

    tracing::debug!(
        "Loaded {} backend(s) and {} tester(s) from {}",
        config.backends.len(),
        config.testers.len(),
        origin.display()
    );

    Ok(config)
}

/// Read and parse the configuration file at `path`.
pub fn load_config(path: &Path) -> Result<RunConfig, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    parse_config(&contents, path)
}
