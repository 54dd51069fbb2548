//! `plan`: show the matrix a config file describes.

use std::fmt::Write as _;
use std::path::Path;

use serde::Serialize;

use crate::config::{RunConfig, load_config};
use crate::model::{BackendSpec, TesterSpec};

#[derive(Serialize)]
struct PlanDocument<'a> {
    backends: &'a [BackendSpec],
    testers: &'a [TesterSpec],
    pairs: usize,
}

fn backend_source(backend: &BackendSpec) -> String {
    if backend.stack {
        return "docker-compose stack".to_string();
    }
    match (&backend.image, &backend.build) {
        (Some(image), _) => format!("image {}", image),
        (None, Some(path)) => format!("build {}", path.display()),
        (None, None) => "build .".to_string(),
    }
}

/// Human-readable matrix: each backend followed by the testers run
/// against it.
pub fn render_plan(config: &RunConfig) -> String {
    let mut out = String::new();

    for (i, backend) in config.backends.iter().enumerate() {
        let _ = write!(out, "{}. {} ({}", i + 1, backend, backend_source(backend));
        let command = backend.launch_command();
        if !command.is_empty() {
            let _ = write!(out, ", command: {}", command.join(" "));
        }
        out.push_str(")\n");

        for tester in &config.testers {
            let _ = writeln!(out, "   x {}", tester);
        }
    }

    let _ = write!(
        out,
        "{} backends, {} testers, {} runs",
        config.backends.len(),
        config.testers.len(),
        config.backends.len() * config.testers.len()
    );
    out
}

/// Load, validate and print the matrix in `config_file`.
pub fn run_plan_command(config_file: &Path, json: bool) -> anyhow::Result<()> {
    let config = load_config(config_file)?;
    config.validate()?;

    if json {
        let document = PlanDocument {
            backends: &config.backends,
            testers: &config.testers,
            pairs: config.backends.len() * config.testers.len(),
        };
        println!("{}", serde_json::to_string_pretty(&document)?);
    } else {
        println!("{}", render_plan(&config));
    }
    Ok(())
}
