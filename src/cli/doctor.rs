//! `doctor`: check Docker prerequisites and show resolved settings.

use crate::config::Settings;
use crate::engine::{DockerDetection, check_docker};

fn check_mark(ok: bool) -> &'static str {
    if ok { "ok" } else { "FAIL" }
}

/// Report lines for a detection result and the settings it was run with.
pub(crate) fn render_report(detection: &DockerDetection, settings: &Settings) -> Vec<String> {
    let mut lines = vec![
        format!(
            "  [{}] {}: {}",
            check_mark(detection.status.is_ready()),
            settings.docker_bin,
            detection.status
        ),
        format!(
            "  [{}] {}: {}",
            check_mark(detection.compose_installed),
            settings.compose_bin,
            if detection.compose_installed {
                "found"
            } else {
                "not found, docker-compose backends will not work"
            }
        ),
        format!("  docker host: {}", settings.docker_host),
        format!(
            "  readiness: {} attempts, {:?} timeout, {:?} delay",
            settings.probe.max_attempts,
            settings.probe.per_attempt_timeout,
            settings.probe.delay_between_attempts
        ),
        format!("  compose network: {}", settings.stack.network()),
    ];

    if let Some(remedy) = detection.remedy() {
        lines.push(String::new());
        lines.push(format!("  {}", remedy));
    }
    lines
}

/// Run the Docker checks and fail when Docker is unusable.
pub async fn run_doctor_command() -> anyhow::Result<()> {
    let settings = Settings::from_env()?;
    let detection = check_docker(&settings).await;

    println!("Docker diagnostics:");
    for line in render_report(&detection, &settings) {
        println!("{}", line);
    }

    if !detection.status.is_ready() {
        anyhow::bail!("Docker is {}", detection.status);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::DockerStatus;

    #[test]
    fn test_report_for_missing_daemon_includes_remedy() {
        let detection = DockerDetection {
            status: DockerStatus::DaemonUnreachable,
            compose_installed: false,
            docker_bin: "docker".to_string(),
        };
        let lines = render_report(&detection, &Settings::default());

        assert_eq!(lines[0], "  [FAIL] docker: not responding");
        assert!(lines[1].starts_with("  [FAIL] docker-compose: not found"));
        assert_eq!(lines[4], "  compose network: tupelo_default");
        assert_eq!(
            lines.last().map(String::as_str),
            Some("  Start the Docker daemon or point DOCKER_HOST at one that is running")
        );
    }

    #[test]
    fn test_report_when_ready_has_no_remedy() {
        let detection = DockerDetection {
            status: DockerStatus::Ready,
            compose_installed: true,
            docker_bin: "docker".to_string(),
        };
        let lines = render_report(&detection, &Settings::default());

        assert_eq!(lines.len(), 5);
        assert_eq!(lines[0], "  [ok] docker: ready");
    }
}
