//! Test doubles for the container engine and the readiness prober.
//!
//! Provides:
//! - [`FakeEngine`]: A scriptable [`ContainerEngine`] that records every call
//! - [`ScriptedDialer`]: A [`Dialer`] whose hosts become reachable after N attempts
//! - [`RecordingObserver`]: Counts probe attempts
//! - [`FailingObserver`]: Fails every progress callback
//! - [`PanickingObserver`]: Panics in every progress callback
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tupelo_integration::testing::{FakeEngine, ScriptedDialer};
//!
//! let engine = Arc::new(FakeEngine::new().with_address("container-1", "172.17.0.2"));
//! let dialer = ScriptedDialer::new().reachable_after("172.17.0.2", 1);
//! ```

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::engine::{ContainerEngine, RunSpec};
use crate::error::EngineError;
use crate::readiness::{Dialer, ProbeAttempt, ProbeObserver};

/// Image id returned by [`FakeEngine::build`] unless overridden.
pub const FAKE_BUILD_IMAGE: &str = "sha256:fake";

/// A scriptable container engine.
///
/// Supports:
/// - A call log via [`calls()`](Self::calls), one `"<method> <args>"` line per call
/// - Container addresses via [`with_address()`](Self::with_address)
/// - Queued tester exit codes via [`with_exit_codes()`](Self::with_exit_codes)
/// - Failure toggles for builds, pulls, daemon create/start and stack starts
///
/// Daemon containers are named `container-1`, `container-2`, ... in creation order.
pub struct FakeEngine {
    build_image: String,
    capture_output: String,
    addresses: HashMap<String, String>,
    exit_codes: Mutex<VecDeque<i32>>,
    calls: Mutex<Vec<String>>,
    foreground_runs: Mutex<Vec<RunSpec>>,
    created: AtomicU32,
    fail_builds: AtomicBool,
    fail_pulls: AtomicBool,
    fail_create_daemon: AtomicBool,
    fail_start_daemon: AtomicBool,
    fail_stack_up: AtomicBool,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self {
            build_image: FAKE_BUILD_IMAGE.to_string(),
            capture_output: String::new(),
            addresses: HashMap::new(),
            exit_codes: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            foreground_runs: Mutex::new(Vec::new()),
            created: AtomicU32::new(0),
            fail_builds: AtomicBool::new(false),
            fail_pulls: AtomicBool::new(false),
            fail_create_daemon: AtomicBool::new(false),
            fail_start_daemon: AtomicBool::new(false),
            fail_stack_up: AtomicBool::new(false),
        }
    }

    /// Image id returned by every build.
    pub fn with_build_image(mut self, image: impl Into<String>) -> Self {
        self.build_image = image.into();
        self
    }

    /// Output of every captured run.
    pub fn with_capture_output(mut self, output: impl Into<String>) -> Self {
        self.capture_output = output.into();
        self
    }

    /// Address reported for `container` once it is inspected.
    pub fn with_address(mut self, container: impl Into<String>, ip: impl Into<String>) -> Self {
        self.addresses.insert(container.into(), ip.into());
        self
    }

    /// Exit codes handed out to foreground runs in order. Runs past the end
    /// exit 0.
    pub fn with_exit_codes(self, codes: Vec<i32>) -> Self {
        if let Ok(mut queue) = self.exit_codes.lock() {
            queue.extend(codes);
        }
        self
    }

    pub fn failing_builds(self) -> Self {
        self.fail_builds.store(true, Ordering::Relaxed);
        self
    }

    pub fn failing_pulls(self) -> Self {
        self.fail_pulls.store(true, Ordering::Relaxed);
        self
    }

    pub fn failing_create_daemon(self) -> Self {
        self.fail_create_daemon.store(true, Ordering::Relaxed);
        self
    }

    /// Daemon containers are created but refuse to start.
    pub fn failing_start_daemon(self) -> Self {
        self.fail_start_daemon.store(true, Ordering::Relaxed);
        self
    }

    pub fn failing_stack_up(self) -> Self {
        self.fail_stack_up.store(true, Ordering::Relaxed);
        self
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Number of calls to `method`.
    pub fn count(&self, method: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| call.split(' ').next() == Some(method))
            .count()
    }

    /// Every spec passed to `run_foreground`, in order.
    pub fn foreground_runs(&self) -> Vec<RunSpec> {
        self.foreground_runs
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    fn record(&self, method: &str, args: &[&str]) {
        let line = std::iter::once(method)
            .chain(args.iter().copied())
            .collect::<Vec<_>>()
            .join(" ");
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(line);
        }
    }

    fn record_spec(&self, method: &str, spec: &RunSpec) {
        let mut args = vec![spec.image.as_str()];
        args.extend(spec.command.iter().map(String::as_str));
        self.record(method, &args);
    }

    fn failure(command: &str) -> EngineError {
        EngineError::Command {
            command: command.to_string(),
            reason: "scripted failure".to_string(),
        }
    }
}

impl Default for FakeEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContainerEngine for FakeEngine {
    async fn build(&self, context: &Path) -> Result<String, EngineError> {
        self.record("build", &[&context.display().to_string()]);
        if self.fail_builds.load(Ordering::Relaxed) {
            return Err(Self::failure("docker build"));
        }
        Ok(self.build_image.clone())
    }

    async fn pull(&self, image: &str) -> Result<(), EngineError> {
        self.record("pull", &[image]);
        if self.fail_pulls.load(Ordering::Relaxed) {
            return Err(EngineError::ImagePullFailed {
                image: image.to_string(),
                reason: "scripted failure".to_string(),
            });
        }
        Ok(())
    }

    async fn create_daemon(&self, spec: &RunSpec) -> Result<String, EngineError> {
        self.record_spec("create_daemon", spec);
        if self.fail_create_daemon.load(Ordering::Relaxed) {
            return Err(Self::failure("docker create"));
        }
        let n = self.created.fetch_add(1, Ordering::Relaxed) + 1;
        Ok(format!("container-{}", n))
    }

    async fn start_daemon(&self, container: &str) -> Result<(), EngineError> {
        self.record("start_daemon", &[container]);
        if self.fail_start_daemon.load(Ordering::Relaxed) {
            return Err(Self::failure("docker start"));
        }
        Ok(())
    }

    async fn run_foreground(&self, spec: &RunSpec) -> Result<i32, EngineError> {
        self.record_spec("run_foreground", spec);
        if let Ok(mut runs) = self.foreground_runs.lock() {
            runs.push(spec.clone());
        }
        let code = self
            .exit_codes
            .lock()
            .ok()
            .and_then(|mut queue| queue.pop_front())
            .unwrap_or(0);
        Ok(code)
    }

    async fn run_capture(&self, spec: &RunSpec) -> Result<String, EngineError> {
        self.record_spec("run_capture", spec);
        Ok(self.capture_output.clone())
    }

    async fn inspect_address(&self, container: &str) -> Result<Option<String>, EngineError> {
        self.record("inspect_address", &[container]);
        Ok(self.addresses.get(container).cloned())
    }

    async fn remove(&self, container: &str) -> Result<(), EngineError> {
        self.record("remove", &[container]);
        Ok(())
    }

    async fn stack_up(&self, project: &str) -> Result<(), EngineError> {
        self.record("stack_up", &[project]);
        if self.fail_stack_up.load(Ordering::Relaxed) {
            return Err(Self::failure("docker-compose up"));
        }
        Ok(())
    }

    async fn stack_down(&self, project: &str) -> Result<(), EngineError> {
        self.record("stack_down", &[project]);
        Ok(())
    }
}

/// A dialer whose hosts answer from a given attempt onward.
///
/// Hosts that were never scripted never answer.
#[derive(Default)]
pub struct ScriptedDialer {
    reachable_after: HashMap<String, u32>,
    attempts: Mutex<HashMap<String, u32>>,
}

impl ScriptedDialer {
    pub fn new() -> Self {
        Self::default()
    }

    /// `host` accepts connections from its `attempt`-th dial onward.
    pub fn reachable_after(mut self, host: impl Into<String>, attempt: u32) -> Self {
        self.reachable_after.insert(host.into(), attempt);
        self
    }

    /// Dials made against `host`.
    pub fn attempts(&self, host: &str) -> u32 {
        self.attempts
            .lock()
            .ok()
            .and_then(|a| a.get(host).copied())
            .unwrap_or(0)
    }

    /// Dials made against every host.
    pub fn total_attempts(&self) -> u32 {
        self.attempts
            .lock()
            .map(|a| a.values().sum())
            .unwrap_or(0)
    }
}

#[async_trait]
impl Dialer for ScriptedDialer {
    async fn dial(&self, host: &str, _port: u16, _timeout: Duration) -> bool {
        let attempt = match self.attempts.lock() {
            Ok(mut attempts) => {
                let count = attempts.entry(host.to_string()).or_insert(0);
                *count += 1;
                *count
            }
            Err(_) => return false,
        };
        self.reachable_after
            .get(host)
            .is_some_and(|&after| attempt >= after)
    }
}

/// Counts probe attempts.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    attempts: AtomicU32,
}

impl RecordingObserver {
    pub fn count(&self) -> u32 {
        self.attempts.load(Ordering::Relaxed)
    }
}

impl ProbeObserver for RecordingObserver {
    fn on_attempt(&self, _attempt: &ProbeAttempt<'_>) -> std::io::Result<()> {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// Fails every callback, like a progress writer whose terminal went away.
#[derive(Debug, Default)]
pub struct FailingObserver;

impl ProbeObserver for FailingObserver {
    fn on_attempt(&self, _attempt: &ProbeAttempt<'_>) -> std::io::Result<()> {
        Err(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            "progress writer closed",
        ))
    }
}

/// Panics on every callback.
#[derive(Debug, Default)]
pub struct PanickingObserver;

impl ProbeObserver for PanickingObserver {
    fn on_attempt(&self, attempt: &ProbeAttempt<'_>) -> std::io::Result<()> {
        panic!("progress observer panicked on {}", attempt.host);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fake_engine_names_containers_in_creation_order() {
        let engine = FakeEngine::new();
        let spec = RunSpec::new("quorumcontrol/tupelo:master");

        assert_eq!(engine.run_daemon(&spec).await.unwrap(), "container-1");
        assert_eq!(engine.run_daemon(&spec).await.unwrap(), "container-2");
        assert_eq!(engine.count("create_daemon"), 2);
        assert_eq!(engine.count("start_daemon"), 2);
        assert_eq!(engine.count("remove"), 0);
    }

    #[tokio::test]
    async fn test_run_daemon_removes_container_that_will_not_start() {
        let engine = FakeEngine::new().failing_start_daemon();
        let spec = RunSpec::new("quorumcontrol/tupelo:master");

        let err = engine.run_daemon(&spec).await.unwrap_err();

        assert!(matches!(err, EngineError::Command { ref command, .. } if command == "docker start"));
        assert_eq!(
            engine.calls(),
            vec![
                "create_daemon quorumcontrol/tupelo:master",
                "start_daemon container-1",
                "remove container-1",
            ]
        );
    }

    #[tokio::test]
    async fn test_run_daemon_create_failure_leaves_nothing_to_remove() {
        let engine = FakeEngine::new().failing_create_daemon();
        let spec = RunSpec::new("quorumcontrol/tupelo:master");

        assert!(engine.run_daemon(&spec).await.is_err());
        assert_eq!(engine.count("start_daemon"), 0);
        assert_eq!(engine.count("remove"), 0);
    }

    #[tokio::test]
    async fn test_fake_engine_hands_out_exit_codes_in_order() {
        let engine = FakeEngine::new().with_exit_codes(vec![2, 0]);
        let spec = RunSpec::new("tester");

        assert_eq!(engine.run_foreground(&spec).await.unwrap(), 2);
        assert_eq!(engine.run_foreground(&spec).await.unwrap(), 0);
        assert_eq!(engine.run_foreground(&spec).await.unwrap(), 0);
    }

    #[test]
    fn test_failing_pull_names_image() {
        let engine = FakeEngine::new().failing_pulls();

        let err = tokio_test::block_on(engine.pull("quorumcontrol/tupelo:latest")).unwrap_err();

        assert!(matches!(
            err,
            EngineError::ImagePullFailed { ref image, .. } if image == "quorumcontrol/tupelo:latest"
        ));
        assert_eq!(engine.calls(), vec!["pull quorumcontrol/tupelo:latest"]);
    }

    #[tokio::test]
    async fn test_scripted_dialer_counts_per_host() {
        let dialer = ScriptedDialer::new().reachable_after("10.0.0.2", 2);
        let timeout = Duration::from_millis(1);

        assert!(!dialer.dial("10.0.0.2", 1, timeout).await);
        assert!(dialer.dial("10.0.0.2", 1, timeout).await);
        assert!(!dialer.dial("10.0.0.3", 1, timeout).await);

        assert_eq!(dialer.attempts("10.0.0.2"), 2);
        assert_eq!(dialer.total_attempts(), 3);
    }
}
