//! Backend × tester run matrix.
//!
//! Backends run one at a time in declaration order. Every tester runs against
//! each backend in declaration order, sequentially, sharing the backend that
//! was brought up for the group.

use crate::error::ConfigError;
use crate::lifecycle::StackLifecycleManager;
use crate::model::{BackendSpec, RunRecord, TesterSpec};

/// Exit code recorded for testers of a backend that never became ready, and
/// for testers that could not be built or launched.
pub const GROUP_FAILURE_CODE: i32 = 1;

/// Outcome of a whole matrix run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatrixReport {
    pub records: Vec<RunRecord>,
}

impl MatrixReport {
    /// 0 when every pair passed, otherwise the code of the first failing pair.
    pub fn exit_code(&self) -> i32 {
        first_failure(self.records.iter().map(|r| r.exit_code))
    }

    pub fn passed(&self) -> usize {
        self.records.iter().filter(|r| r.passed()).count()
    }

    pub fn failed(&self) -> usize {
        self.records.len() - self.passed()
    }

    /// One line per pair followed by the totals.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        for record in &self.records {
            out.push_str(&record.to_string());
            out.push('\n');
        }
        out.push_str(&format!(
            "{} passed, {} failed",
            self.passed(),
            self.failed()
        ));
        out
    }
}

/// First non-zero code, or 0.
pub fn first_failure(codes: impl IntoIterator<Item = i32>) -> i32 {
    codes.into_iter().find(|&code| code != 0).unwrap_or(0)
}

/// Drives every (backend, tester) pair through a [`StackLifecycleManager`].
pub struct RunMatrix {
    manager: StackLifecycleManager,
}

impl RunMatrix {
    pub fn new(manager: StackLifecycleManager) -> Self {
        Self { manager }
    }

    /// Run the full matrix.
    ///
    /// Every backend is validated before anything is started, so a
    /// configuration error means no engine call was made. Backend failures
    /// are recorded against each of their testers and the run moves on to the
    /// next backend.
    pub async fn run_all(
        &mut self,
        backends: Vec<BackendSpec>,
        testers: &[TesterSpec],
    ) -> Result<MatrixReport, ConfigError> {
        for backend in &backends {
            backend.validate()?;
        }

        let mut report = MatrixReport::default();

        if testers.is_empty() {
            tracing::warn!("No testers configured, nothing to run");
            return Ok(report);
        }

        for backend in backends {
            self.run_group(backend, testers, &mut report.records).await;
        }

        Ok(report)
    }

    async fn run_group(
        &mut self,
        backend: BackendSpec,
        testers: &[TesterSpec],
        records: &mut Vec<RunRecord>,
    ) {
        let label = backend.clone();

        let mut group = match self.manager.start_group(backend).await {
            Ok(group) => group,
            Err(e) => {
                println!("Backend {} failed: {}", label, e);
                for tester in testers {
                    records.push(RunRecord {
                        backend: label.clone(),
                        tester: tester.clone(),
                        exit_code: GROUP_FAILURE_CODE,
                    });
                }
                return;
            }
        };

        let mut remaining = testers.iter();
        while let Some(tester) = remaining.next() {
            println!(
                "Running {} test suite with {} tupelo",
                tester,
                group.backend()
            );
            match self.manager.run_tester(&mut group, tester).await {
                Ok(exit_code) => {
                    if exit_code != 0 {
                        tracing::warn!("{} exited with code {}", tester, exit_code);
                    }
                    records.push(RunRecord {
                        backend: group.backend().clone(),
                        tester: tester.clone(),
                        exit_code,
                    });
                }
                Err(e) => {
                    // The tester never ran; skip the rest of this backend.
                    println!("Backend {} failed: {}", group.backend(), e);
                    for tester in std::iter::once(tester).chain(remaining.by_ref()) {
                        records.push(RunRecord {
                            backend: group.backend().clone(),
                            tester: tester.clone(),
                            exit_code: GROUP_FAILURE_CODE,
                        });
                    }
                }
            }
        }

        self.manager.end_group(group).await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::config::{ProbeSettings, Settings};
    use crate::readiness::{Prober, ReadinessCoordinator, SilentProgress};
    use crate::testing::{FakeEngine, ScriptedDialer};

    fn matrix(engine: Arc<FakeEngine>, dialer: ScriptedDialer) -> RunMatrix {
        let settings = Settings {
            probe: ProbeSettings {
                max_attempts: 3,
                per_attempt_timeout: Duration::from_millis(5),
                delay_between_attempts: Duration::from_millis(1),
            },
            inspect_attempts: 2,
            inspect_delay: Duration::from_millis(1),
            ..Default::default()
        };
        let coordinator = ReadinessCoordinator::new(Prober::new(
            Arc::new(dialer),
            Arc::new(SilentProgress),
            settings.probe,
        ));
        RunMatrix::new(StackLifecycleManager::new(engine, coordinator, settings))
    }

    fn tester(name: &str) -> TesterSpec {
        TesterSpec {
            name: name.to_string(),
            image: Some(format!("quorumcontrol/{}", name)),
            ..Default::default()
        }
    }

    fn record_codes(report: &MatrixReport) -> Vec<i32> {
        report.records.iter().map(|r| r.exit_code).collect()
    }

    #[test]
    fn test_first_failure_code() {
        assert_eq!(first_failure([0, 1, 0]), 1);
        assert_eq!(first_failure([0, 0, 0]), 0);
        assert_eq!(first_failure([0, 3, 2]), 3);
        assert_eq!(first_failure([]), 0);
    }

    #[test]
    fn test_summary_lists_every_pair() {
        let report = MatrixReport {
            records: vec![
                RunRecord {
                    backend: BackendSpec {
                        name: "latest".to_string(),
                        ..Default::default()
                    },
                    tester: tester("go-sdk"),
                    exit_code: 0,
                },
                RunRecord {
                    backend: BackendSpec {
                        name: "latest".to_string(),
                        ..Default::default()
                    },
                    tester: tester("js-sdk"),
                    exit_code: 2,
                },
            ],
        };

        insta::assert_snapshot!(report.summary(), @r"
        PASS             latest x go-sdk
        FAIL (code 2)    latest x js-sdk
        1 passed, 1 failed
        ");
        assert_eq!(report.exit_code(), 2);
    }

    #[tokio::test]
    async fn test_exit_code_is_first_failing_pair() {
        let engine = Arc::new(
            FakeEngine::new()
                .with_address("container-1", "172.17.0.2")
                .with_exit_codes(vec![0, 1, 0]),
        );
        let mut matrix = matrix(
            engine.clone(),
            ScriptedDialer::new().reachable_after("172.17.0.2", 1),
        );

        let backends = vec![BackendSpec {
            image: Some("quorumcontrol/tupelo:master".to_string()),
            ..Default::default()
        }];
        let testers = vec![tester("a"), tester("b"), tester("c")];
        let report = matrix.run_all(backends, &testers).await.unwrap();

        assert_eq!(record_codes(&report), vec![0, 1, 0]);
        assert_eq!(report.exit_code(), 1);
        assert_eq!(engine.count("remove"), 1);
    }

    #[tokio::test]
    async fn test_unready_backend_fails_its_testers_and_matrix_continues() {
        let engine = Arc::new(
            FakeEngine::new()
                .with_address("container-1", "172.17.0.2")
                .with_address("container-2", "172.17.0.3"),
        );
        let mut matrix = matrix(
            engine.clone(),
            ScriptedDialer::new().reachable_after("172.17.0.3", 1),
        );

        let backends = vec![
            BackendSpec {
                name: "broken".to_string(),
                image: Some("a:1".to_string()),
                ..Default::default()
            },
            BackendSpec {
                name: "working".to_string(),
                image: Some("b:1".to_string()),
                ..Default::default()
            },
        ];
        let testers = vec![tester("a"), tester("b")];
        let report = matrix.run_all(backends, &testers).await.unwrap();

        assert_eq!(record_codes(&report), vec![1, 1, 0, 0]);
        assert_eq!(report.exit_code(), 1);
        assert_eq!(engine.count("run_foreground"), 2);
        assert_eq!(engine.count("remove"), 2);
    }

    #[tokio::test]
    async fn test_tester_build_failure_fails_rest_of_group() {
        let engine = Arc::new(
            FakeEngine::new()
                .failing_builds()
                .with_address("container-1", "172.17.0.2")
                .with_address("container-2", "172.17.0.3"),
        );
        let mut matrix = matrix(
            engine.clone(),
            ScriptedDialer::new()
                .reachable_after("172.17.0.2", 1)
                .reachable_after("172.17.0.3", 1),
        );

        let backends = vec![
            BackendSpec {
                name: "first".to_string(),
                image: Some("a:1".to_string()),
                ..Default::default()
            },
            BackendSpec {
                name: "second".to_string(),
                image: Some("b:1".to_string()),
                ..Default::default()
            },
        ];
        let built = TesterSpec {
            name: "go-sdk".to_string(),
            build: Some(std::path::PathBuf::from("./sdk")),
            ..Default::default()
        };
        let testers = vec![built, tester("js-sdk")];
        let report = matrix.run_all(backends, &testers).await.unwrap();

        assert_eq!(record_codes(&report), vec![1, 1, 1, 1]);
        assert_eq!(report.exit_code(), GROUP_FAILURE_CODE);
        assert_eq!(engine.count("build"), 2);
        assert_eq!(engine.count("run_foreground"), 0);
        assert_eq!(engine.count("remove"), 2);
    }

    #[tokio::test]
    async fn test_no_testers_starts_nothing() {
        let engine = Arc::new(FakeEngine::new());
        let mut matrix = matrix(engine.clone(), ScriptedDialer::new());

        let report = matrix
            .run_all(vec![BackendSpec::default()], &[])
            .await
            .unwrap();

        assert!(report.records.is_empty());
        assert_eq!(report.exit_code(), 0);
        assert!(engine.calls().is_empty());
    }
}
