//! Backend version lookup.
//!
//! The backend image is asked for its version (`<image> version`). When that
//! yields no semantic version the image tag is used, and failing that the
//! literal `snapshot`.

use std::sync::LazyLock;

use regex::Regex;

use crate::engine::{ContainerEngine, RunSpec};

/// Version reported when nothing better is known.
pub const SNAPSHOT_VERSION: &str = "snapshot";

static VERSION_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"v(\d+\.\d+\.\d+)").expect("version pattern is valid"));

/// First `vX.Y.Z` in `output`, without the leading `v`.
pub fn version_from_output(output: &str) -> Option<String> {
    VERSION_PATTERN
        .captures(output)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Tag of an image reference: the segment after the last `:`, unless that
/// colon belongs to a registry port.
pub fn version_from_image_ref(image: &str) -> Option<String> {
    let (_, tag) = image.rsplit_once(':')?;
    if tag.is_empty() || tag.contains('/') {
        return None;
    }
    Some(tag.to_string())
}

/// Version from the `version` output, else the image tag, else `snapshot`.
pub fn pick_version(output: Option<&str>, image: Option<&str>) -> String {
    output
        .and_then(version_from_output)
        .or_else(|| image.and_then(version_from_image_ref))
        .unwrap_or_else(|| SNAPSHOT_VERSION.to_string())
}

/// Run `<image> version` in a throwaway container and pick a version.
pub async fn resolve_version(engine: &dyn ContainerEngine, image: Option<&str>) -> String {
    let output = match image {
        Some(image) => {
            let spec = RunSpec::new(image).with_command(vec!["version".to_string()]);
            match engine.run_capture(&spec).await {
                Ok(output) => Some(output),
                Err(e) => {
                    tracing::debug!("Version lookup for {} failed: {}", image, e);
                    None
                }
            }
        }
        None => None,
    };

    let version = pick_version(output.as_deref(), image);
    tracing::info!("Resolved backend version {}", version);
    version
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeEngine;

    #[test]
    fn test_semver_from_output() {
        assert_eq!(
            pick_version(Some("tupelo v1.2.3 (commit abcdef)"), Some("foo:edge")),
            "1.2.3"
        );
    }

    #[test]
    fn test_tag_when_output_has_no_version() {
        assert_eq!(pick_version(Some("unknown command"), Some("foo:edge")), "edge");
        assert_eq!(pick_version(None, Some("foo:edge")), "edge");
    }

    #[test]
    fn test_snapshot_when_nothing_matches() {
        assert_eq!(pick_version(Some("no version here"), Some("foo")), "snapshot");
        assert_eq!(pick_version(None, None), "snapshot");
    }

    #[test]
    fn test_registry_port_is_not_a_tag() {
        assert_eq!(version_from_image_ref("localhost:5000/tupelo"), None);
        assert_eq!(
            version_from_image_ref("localhost:5000/tupelo:0.4.0").as_deref(),
            Some("0.4.0")
        );
    }

    #[tokio::test]
    async fn test_resolve_version_runs_image() {
        let engine = FakeEngine::new().with_capture_output("Tupelo v0.5.1\n");

        let version = resolve_version(&engine, Some("quorumcontrol/tupelo:master")).await;

        assert_eq!(version, "0.5.1");
        assert!(
            engine
                .calls()
                .contains(&"run_capture quorumcontrol/tupelo:master version".to_string())
        );
    }

    #[tokio::test]
    async fn test_resolve_version_without_image_skips_engine() {
        let engine = FakeEngine::new();
        assert_eq!(resolve_version(&engine, None).await, "snapshot");
        assert!(engine.calls().is_empty());
    }
}
