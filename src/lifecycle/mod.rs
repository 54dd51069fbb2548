//! Backend group lifecycle.
//!
//! A backend group is one backend instance shared by every tester configured
//! against it. It moves through these phases:
//!
//! ```text
//! Idle ─▶ ImageResolved ─▶ Starting ─▶ AwaitingReady ─▶ Ready ─┬─▶ TornDown
//!                                                        ▲     │
//!                                                        └─ RunningTester
//! ```
//!
//! Readiness is established once per group. Testers never re-probe.
//! [`StackLifecycleManager::start_group`] hands back an owned [`BackendGroup`]
//! and [`StackLifecycleManager::end_group`] consumes it, so a group is torn
//! down exactly once.

pub mod env;
pub mod version;

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::{BOOTSTRAP_PORT, RPC_PORT, Settings};
use crate::engine::{ContainerEngine, RunSpec};
use crate::error::{EngineError, LifecycleError, Result};
use crate::model::{BackendSpec, DEFAULT_BUILD_PATH, TesterSpec};
use crate::readiness::{DiscoveredEndpoint, ReadinessCoordinator, ReadinessTarget};

/// Readiness target name of the stack's bootstrap node.
pub const BOOTSTRAP_TARGET: &str = "bootstrapper";

/// Readiness target name of the RPC server.
pub const RPC_TARGET: &str = "rpcServer";

/// Phase of a backend group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendPhase {
    Idle,
    ImageResolved,
    Starting,
    AwaitingReady,
    Ready,
    RunningTester,
    TornDown,
}

impl BackendPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendPhase::Idle => "idle",
            BackendPhase::ImageResolved => "image resolved",
            BackendPhase::Starting => "starting",
            BackendPhase::AwaitingReady => "awaiting ready",
            BackendPhase::Ready => "ready",
            BackendPhase::RunningTester => "running tester",
            BackendPhase::TornDown => "torn down",
        }
    }
}

impl fmt::Display for BackendPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How to remove a started backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Teardown {
    /// Remove a single daemon container.
    RemoveContainer { id: String },
    /// Bring a compose project down.
    StackDown { project: String },
}

impl Teardown {
    async fn run(&self, engine: &dyn ContainerEngine) -> std::result::Result<(), EngineError> {
        match self {
            Teardown::RemoveContainer { id } => {
                println!("Stopping tupelo container");
                engine.remove(id).await
            }
            Teardown::StackDown { project } => {
                println!("Stopping tupelo docker-compose stack");
                engine.stack_down(project).await
            }
        }
    }
}

/// Connection details of the backend that is currently alive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunningBackend {
    /// Container address of the RPC server.
    pub rpc_host: String,
    /// Container address of the bootstrap node, stack mode only.
    pub bootstrap_host: Option<String>,
    /// Network testers join.
    pub network: Option<String>,
    /// Version reported by the backend image.
    pub version: String,
    /// Which candidate answered for each readiness target.
    pub endpoints: HashMap<String, DiscoveredEndpoint>,
}

/// A started, ready backend and the handle that removes it.
#[derive(Debug)]
pub struct BackendGroup {
    backend: BackendSpec,
    running: RunningBackend,
    teardown: Teardown,
    phase: BackendPhase,
}

impl BackendGroup {
    /// The backend with its image and network resolved.
    pub fn backend(&self) -> &BackendSpec {
        &self.backend
    }

    pub fn running(&self) -> &RunningBackend {
        &self.running
    }

    pub fn teardown(&self) -> &Teardown {
        &self.teardown
    }

    pub fn phase(&self) -> BackendPhase {
        self.phase
    }
}

/// Container addresses learned right after start.
struct StartedBackend {
    rpc_address: String,
    bootstrap_address: Option<String>,
}

/// Sequences image resolution, start, readiness, tester runs and teardown
/// for one backend at a time.
pub struct StackLifecycleManager {
    engine: Arc<dyn ContainerEngine>,
    coordinator: ReadinessCoordinator,
    settings: Settings,
    /// Label of the backend that is currently alive.
    active: Option<String>,
}

impl StackLifecycleManager {
    pub fn new(
        engine: Arc<dyn ContainerEngine>,
        coordinator: ReadinessCoordinator,
        settings: Settings,
    ) -> Self {
        Self {
            engine,
            coordinator,
            settings,
            active: None,
        }
    }

    /// Label of the backend currently alive, if any.
    pub fn active_backend(&self) -> Option<&str> {
        self.active.as_deref()
    }

    fn transition(backend: &BackendSpec, phase: BackendPhase) {
        tracing::debug!("Backend {}: {}", backend, phase);
    }

    /// Bring `backend` from idle to ready.
    ///
    /// On failure anything already started is torn down before the error is
    /// returned.
    pub async fn start_group(&mut self, mut backend: BackendSpec) -> Result<BackendGroup> {
        if let Some(active) = &self.active {
            return Err(LifecycleError::BackendStillRunning {
                active: active.clone(),
                requested: backend.to_string(),
            });
        }
        Self::transition(&backend, BackendPhase::Idle);

        self.resolve_backend_image(&mut backend).await?;
        Self::transition(&backend, BackendPhase::ImageResolved);

        Self::transition(&backend, BackendPhase::Starting);
        let (teardown, started) = self.launch(&mut backend).await?;
        self.active = Some(backend.to_string());

        let discovered = match started {
            Ok(started) => {
                Self::transition(&backend, BackendPhase::AwaitingReady);
                self.await_ready(&started).await.map(|endpoints| (started, endpoints))
            }
            Err(e) => Err(e),
        };

        let (started, endpoints) = match discovered {
            Ok(found) => found,
            Err(e) => {
                tracing::error!("Backend {} failed to start: {}", backend, e);
                self.release(&backend, &teardown).await;
                return Err(e);
            }
        };

        let version = version::resolve_version(self.engine.as_ref(), backend.image.as_deref()).await;

        let running = RunningBackend {
            rpc_host: started.rpc_address,
            bootstrap_host: started.bootstrap_address,
            network: backend.network.clone(),
            version,
            endpoints,
        };
        Self::transition(&backend, BackendPhase::Ready);

        Ok(BackendGroup {
            backend,
            running,
            teardown,
            phase: BackendPhase::Ready,
        })
    }

    /// Run one tester against a ready group and return its exit code.
    ///
    /// An error means the tester image could not be built or the tester
    /// could not be launched at all. The group stays owned by the caller and
    /// must still be passed to [`end_group`](Self::end_group).
    pub async fn run_tester(&self, group: &mut BackendGroup, tester: &TesterSpec) -> Result<i32> {
        group.phase = BackendPhase::RunningTester;
        Self::transition(&group.backend, group.phase);

        let result = self.run_tester_inner(&group.running, tester).await;
        if let Err(e) = &result {
            tracing::error!("{} errored: {}", tester, e);
        }

        group.phase = BackendPhase::Ready;
        Self::transition(&group.backend, group.phase);
        result
    }

    /// Tear the group down and clear the running-backend registry.
    pub async fn end_group(&mut self, mut group: BackendGroup) -> BackendSpec {
        self.release(&group.backend, &group.teardown).await;
        group.phase = BackendPhase::TornDown;
        group.backend
    }

    async fn release(&mut self, backend: &BackendSpec, teardown: &Teardown) {
        if let Err(e) = teardown.run(self.engine.as_ref()).await {
            tracing::error!("Error stopping backend {}: {}", backend, e);
        }
        self.active = None;
        Self::transition(backend, BackendPhase::TornDown);
    }

    /// Build the image when none is given; refresh given images best-effort.
    async fn resolve_backend_image(&self, backend: &mut BackendSpec) -> Result<()> {
        backend.validate()?;

        if backend.stack {
            return Ok(());
        }

        match &backend.image {
            None => {
                let context = backend
                    .build
                    .get_or_insert_with(|| PathBuf::from(DEFAULT_BUILD_PATH))
                    .clone();
                let image = self.engine.build(&context).await?;
                backend.image = Some(image);
            }
            Some(image) if backend.build.is_none() => self.pull_best_effort(image).await,
            Some(_) => {}
        }
        Ok(())
    }

    async fn pull_best_effort(&self, image: &str) {
        if let Err(e) = self.engine.pull(image).await {
            // Offline runs use whatever image is cached.
            tracing::warn!("Could not pull latest image: {}", e);
        }
    }

    /// Start the backend. The outer error means there is nothing to tear
    /// down; the inner one means teardown is still owed.
    async fn launch(
        &self,
        backend: &mut BackendSpec,
    ) -> Result<(Teardown, Result<StartedBackend>)> {
        if backend.stack {
            println!("Starting tupelo docker-compose stack");
            let project = self.settings.stack.project.clone();
            // A failed `up` can leave part of the stack running.
            let teardown = Teardown::StackDown {
                project: project.clone(),
            };

            backend.network = Some(self.settings.stack.network());

            let started = self.start_stack(&project).await;

            return Ok((teardown, started));
        }

        println!("Starting tupelo container");
        let image = backend.image.clone().unwrap_or_default();
        let spec = RunSpec::new(image)
            .with_command(backend.launch_command())
            .with_env(backend.env.clone())
            .with_network(backend.network.clone());
        let id = self.engine.create_daemon(&spec).await?;
        let teardown = Teardown::RemoveContainer { id: id.clone() };

        let started = match self.engine.start_daemon(&id).await {
            Ok(()) => self.discover_address(&id).await.map(|rpc_address| StartedBackend {
                rpc_address,
                bootstrap_address: None,
            }),
            Err(e) => Err(e.into()),
        };

        Ok((teardown, started))
    }

    async fn start_stack(&self, project: &str) -> Result<StartedBackend> {
        self.engine.stack_up(project).await?;
        let bootstrap_address = self
            .discover_address(&self.settings.stack.bootstrap_container)
            .await?;
        let rpc_address = self
            .discover_address(&self.settings.stack.rpc_container)
            .await?;
        Ok(StartedBackend {
            rpc_address,
            bootstrap_address: Some(bootstrap_address),
        })
    }

    /// Poll a just-started container until it reports an IP address.
    async fn discover_address(&self, container: &str) -> Result<String> {
        let attempts = self.settings.inspect_attempts.max(1);
        for attempt in 1..=attempts {
            if let Some(ip) = self.engine.inspect_address(container).await? {
                tracing::debug!("Container {} has address {}", container, ip);
                return Ok(ip);
            }
            if attempt < attempts {
                tokio::time::sleep(self.settings.inspect_delay).await;
            }
        }
        Err(EngineError::AddressUnavailable {
            container: container.to_string(),
            attempts,
        }
        .into())
    }

    /// Probe every readiness target of the started backend.
    async fn await_ready(
        &self,
        started: &StartedBackend,
    ) -> Result<HashMap<String, DiscoveredEndpoint>> {
        let docker_host = self.settings.docker_host.clone();
        let mut targets = vec![ReadinessTarget::new(
            RPC_TARGET,
            vec![docker_host.clone(), started.rpc_address.clone()],
            RPC_PORT,
        )];

        if let Some(bootstrap) = &started.bootstrap_address {
            println!("Waiting for bootstrapper and RPC server to come up");
            targets.insert(
                0,
                ReadinessTarget::new(
                    BOOTSTRAP_TARGET,
                    vec![docker_host, bootstrap.clone()],
                    BOOTSTRAP_PORT,
                ),
            );
        } else {
            println!("Waiting for RPC server to come up");
        }

        let result = self.coordinator.await_all(targets).await;
        println!();

        let endpoints = result?;
        for endpoint in endpoints.values() {
            tracing::info!("{} ready at {}", endpoint.target, endpoint);
        }
        Ok(endpoints)
    }

    async fn run_tester_inner(
        &self,
        running: &RunningBackend,
        tester: &TesterSpec,
    ) -> Result<i32> {
        let image = match &tester.image {
            Some(image) => {
                if tester.build.is_none() {
                    self.pull_best_effort(image).await;
                }
                image.clone()
            }
            None => {
                let context = tester
                    .build
                    .clone()
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_BUILD_PATH));
                self.engine.build(&context).await?
            }
        };

        let spec = RunSpec::new(image)
            .with_command(tester.command.clone())
            .with_env(env::tester_environment(&tester.env, running))
            .with_network(running.network.clone().or_else(|| tester.network.clone()));

        Ok(self.engine.run_foreground(&spec).await?)
    }
}
