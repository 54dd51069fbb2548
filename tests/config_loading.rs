//! Loading run-matrix files from disk.
//!
//! Each test writes its document into a tempdir so nothing depends on the
//! working directory.

use std::path::PathBuf;

use pretty_assertions::assert_eq;
use tempfile::tempdir;

use tupelo_integration::config::load_config;
use tupelo_integration::error::ConfigError;
use tupelo_integration::model::{BackendSpec, TesterSpec};

fn write_config(contents: &str) -> (tempfile::TempDir, PathBuf) {
    let dir = tempdir().unwrap();
    let path = dir.path().join(".tupelo-integration.yml");
    std::fs::write(&path, contents).unwrap();
    (dir, path)
}

#[test]
fn v2_file_loads_backends_and_testers_in_declaration_order() {
    let (_dir, path) = write_config(
        r#"
tupelos:
  zeta:
    image: quorumcontrol/tupelo:0.5.0
    command: ["rpc-server", "-L", "debug"]
  alpha:
    docker-compose: true
  source:
    build: ../tupelo
    env:
      TUPELO_LOG: debug
testers:
  js-sdk:
    image: quorumcontrol/js-sdk
    command: ["npm", "test"]
  go-sdk:
    build: .
    network: sdk
"#,
    );

    let config = load_config(&path).unwrap();
    config.validate().unwrap();

    let names: Vec<&str> = config.backends.iter().map(|b| b.name.as_str()).collect();
    assert_eq!(names, vec!["zeta", "alpha", "source"]);

    assert_eq!(
        config.backends[0].command,
        vec!["rpc-server", "-L", "debug"]
    );
    assert!(config.backends[1].stack);
    assert_eq!(config.backends[2].build, Some(PathBuf::from("../tupelo")));
    assert_eq!(
        config.backends[2].env.get("TUPELO_LOG").map(String::as_str),
        Some("debug")
    );

    assert_eq!(
        config.testers,
        vec![
            TesterSpec {
                name: "js-sdk".to_string(),
                image: Some("quorumcontrol/js-sdk".to_string()),
                command: vec!["npm".to_string(), "test".to_string()],
                ..Default::default()
            },
            TesterSpec {
                name: "go-sdk".to_string(),
                build: Some(PathBuf::from(".")),
                network: Some("sdk".to_string()),
                ..Default::default()
            },
        ]
    );
}

#[test]
fn v1_file_loads_image_strings_and_single_tester() {
    let (_dir, path) = write_config(
        r#"
tupeloImages:
  - quorumcontrol/tupelo:latest
  - quorumcontrol/tupelo:0.4.0 rpc-server -L info
tester:
  build: ./tests
  command: ["./run.sh"]
"#,
    );

    let config = load_config(&path).unwrap();

    assert_eq!(
        config.backends,
        vec![
            BackendSpec {
                image: Some("quorumcontrol/tupelo:latest".to_string()),
                ..Default::default()
            },
            BackendSpec {
                image: Some("quorumcontrol/tupelo:0.4.0".to_string()),
                command: vec![
                    "rpc-server".to_string(),
                    "-L".to_string(),
                    "info".to_string()
                ],
                ..Default::default()
            },
        ]
    );
    assert_eq!(config.backends[0].launch_command(), vec!["rpc-server"]);
    assert_eq!(config.testers.len(), 1);
    assert_eq!(config.testers[0].build, Some(PathBuf::from("./tests")));
}

#[test]
fn stack_with_image_is_rejected_by_validation() {
    let (_dir, path) = write_config(
        r#"
tupelos:
  local:
    docker-compose: true
    image: quorumcontrol/tupelo:latest
testers:
  js-sdk:
    build: .
"#,
    );

    let config = load_config(&path).unwrap();
    let err = config.validate().unwrap_err();

    assert!(matches!(
        err,
        ConfigError::MutuallyExclusive {
            first: "docker-compose",
            second: "image",
            ..
        }
    ));
    assert_eq!(
        err.to_string(),
        "Error in local: docker-compose and image are mutually exclusive"
    );
}

#[test]
fn missing_file_is_a_read_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("absent.yml");

    let err = load_config(&path).unwrap_err();

    assert!(matches!(err, ConfigError::Read { .. }));
    assert!(err.to_string().contains("absent.yml"));
}

#[test]
fn malformed_yaml_is_a_parse_error() {
    let (_dir, path) = write_config("tupelos:\n  latest: [unclosed\n");

    let err = load_config(&path).unwrap_err();

    assert!(matches!(err, ConfigError::Parse { .. }));
}
