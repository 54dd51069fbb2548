//! Single-target readiness probing.
//!
//! Every candidate address of a target is dialed by its own task with its own
//! attempt counter. The first candidate to accept a connection wins and the
//! remaining tasks are aborted.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinSet;

use crate::config::ProbeSettings;
use crate::error::ReadinessError;
use crate::readiness::progress::{ProbeAttempt, ProbeObserver, notify};
use crate::readiness::{DiscoveredEndpoint, ReadinessTarget};

/// Opens connections on behalf of the prober.
#[async_trait]
pub trait Dialer: Send + Sync {
    /// Whether `host:port` accepted a connection within `timeout`.
    async fn dial(&self, host: &str, port: u16, timeout: Duration) -> bool;
}

/// Plain TCP connect.
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpDialer;

#[async_trait]
impl Dialer for TcpDialer {
    async fn dial(&self, host: &str, port: u16, timeout: Duration) -> bool {
        use tokio::net::TcpStream;

        let addr = join_host_port(host, port);
        match tokio::time::timeout(timeout, TcpStream::connect(addr.as_str())).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                tracing::trace!("{} not reachable: {}", addr, e);
                false
            }
            Err(_) => false,
        }
    }
}

/// `host:port`, bracketing IPv6 literals.
pub fn join_host_port(host: &str, port: u16) -> String {
    if host.contains(':') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}

/// Polls the candidates of one [`ReadinessTarget`] until one answers.
#[derive(Clone)]
pub struct Prober {
    dialer: Arc<dyn Dialer>,
    observer: Arc<dyn ProbeObserver>,
    settings: ProbeSettings,
}

impl Prober {
    pub fn new(
        dialer: Arc<dyn Dialer>,
        observer: Arc<dyn ProbeObserver>,
        settings: ProbeSettings,
    ) -> Self {
        Self {
            dialer,
            observer,
            settings,
        }
    }

    pub fn settings(&self) -> &ProbeSettings {
        &self.settings
    }

    /// Wait for any candidate of `target` to accept a connection.
    pub async fn probe(&self, target: &ReadinessTarget) -> Result<DiscoveredEndpoint, ReadinessError> {
        if target.candidates.is_empty() {
            return Err(ReadinessError::NoCandidates {
                target: target.name.clone(),
            });
        }

        let mut searches = JoinSet::new();
        for host in &target.candidates {
            searches.spawn(poll_candidate(
                self.dialer.clone(),
                self.observer.clone(),
                self.settings,
                target.name.clone(),
                host.clone(),
                target.port,
            ));
        }

        while let Some(joined) = searches.join_next().await {
            match joined {
                Ok(Some(host)) => {
                    searches.abort_all();
                    tracing::debug!("{} reachable at {}", target.name, join_host_port(&host, target.port));
                    return Ok(DiscoveredEndpoint {
                        target: target.name.clone(),
                        host,
                        port: target.port,
                    });
                }
                Ok(None) => {}
                Err(e) => tracing::warn!("Probe task for {} failed: {}", target.name, e),
            }
        }

        Err(ReadinessError::Timeout {
            target: target.name.clone(),
            attempts: self.settings.max_attempts,
            statuses: [(target.name.clone(), false)].into_iter().collect(),
        })
    }
}

/// Dial one candidate until it answers or the budget runs out.
async fn poll_candidate(
    dialer: Arc<dyn Dialer>,
    observer: Arc<dyn ProbeObserver>,
    settings: ProbeSettings,
    target: String,
    host: String,
    port: u16,
) -> Option<String> {
    for attempt in 1..=settings.max_attempts {
        notify(
            observer.as_ref(),
            &ProbeAttempt {
                target: &target,
                host: &host,
                port,
                attempt,
            },
        );

        if dialer.dial(&host, port, settings.per_attempt_timeout).await {
            return Some(host);
        }

        if attempt < settings.max_attempts {
            tokio::time::sleep(settings.delay_between_attempts).await;
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::readiness::progress::SilentProgress;
    use crate::testing::{FailingObserver, PanickingObserver, RecordingObserver, ScriptedDialer};

    fn fast_settings(max_attempts: u32) -> ProbeSettings {
        ProbeSettings {
            max_attempts,
            per_attempt_timeout: Duration::from_millis(20),
            delay_between_attempts: Duration::from_millis(1),
        }
    }

    fn target(candidates: &[&str]) -> ReadinessTarget {
        ReadinessTarget::new(
            "rpcServer",
            candidates.iter().map(|c| c.to_string()).collect(),
            50051,
        )
    }

    #[tokio::test]
    async fn test_empty_candidates_fail_immediately() {
        let dialer = Arc::new(ScriptedDialer::new());
        let prober = Prober::new(dialer.clone(), Arc::new(SilentProgress), fast_settings(5));

        let err = prober.probe(&target(&[])).await.unwrap_err();

        assert!(matches!(err, ReadinessError::NoCandidates { .. }));
        assert_eq!(dialer.total_attempts(), 0);
    }

    #[tokio::test]
    async fn test_first_reachable_candidate_wins() {
        let dialer = Arc::new(ScriptedDialer::new().reachable_after("10.0.0.2", 1));
        let prober = Prober::new(dialer.clone(), Arc::new(SilentProgress), fast_settings(50));

        let endpoint = prober.probe(&target(&["127.0.0.1", "10.0.0.2"])).await.unwrap();

        assert_eq!(endpoint.host, "10.0.0.2");
        assert_eq!(endpoint.port, 50051);
        assert_eq!(endpoint.target, "rpcServer");
        assert_eq!(dialer.attempts("10.0.0.2"), 1);
        // The unreachable candidate is abandoned long before its budget is spent.
        assert!(dialer.attempts("127.0.0.1") < 50);
    }

    #[tokio::test]
    async fn test_success_after_retries() {
        let dialer = Arc::new(ScriptedDialer::new().reachable_after("127.0.0.1", 3));
        let observer = Arc::new(RecordingObserver::default());
        let prober = Prober::new(dialer.clone(), observer.clone(), fast_settings(10));

        let endpoint = prober.probe(&target(&["127.0.0.1"])).await.unwrap();

        assert_eq!(endpoint.host, "127.0.0.1");
        assert_eq!(dialer.attempts("127.0.0.1"), 3);
        assert_eq!(observer.count(), 3);
    }

    #[tokio::test]
    async fn test_exhausted_budget_reports_attempts() {
        let dialer = Arc::new(ScriptedDialer::new());
        let prober = Prober::new(dialer.clone(), Arc::new(SilentProgress), fast_settings(4));

        let err = prober
            .probe(&target(&["127.0.0.1", "10.0.0.2"]))
            .await
            .unwrap_err();

        match err {
            ReadinessError::Timeout {
                target, attempts, ..
            } => {
                assert_eq!(target, "rpcServer");
                assert_eq!(attempts, 4);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(dialer.attempts("127.0.0.1"), 4);
        assert_eq!(dialer.attempts("10.0.0.2"), 4);
    }

    #[tokio::test]
    async fn test_failing_observer_does_not_affect_outcome() {
        let dialer = Arc::new(ScriptedDialer::new().reachable_after("127.0.0.1", 2));
        let prober = Prober::new(dialer, Arc::new(FailingObserver), fast_settings(5));

        let endpoint = prober.probe(&target(&["127.0.0.1"])).await.unwrap();
        assert_eq!(endpoint.host, "127.0.0.1");
    }

    #[tokio::test]
    async fn test_panicking_observer_does_not_affect_outcome() {
        let dialer = Arc::new(ScriptedDialer::new().reachable_after("127.0.0.1", 1));
        let prober = Prober::new(dialer.clone(), Arc::new(PanickingObserver), fast_settings(3));

        let endpoint = prober.probe(&target(&["127.0.0.1"])).await.unwrap();

        assert_eq!(endpoint.host, "127.0.0.1");
        assert_eq!(dialer.attempts("127.0.0.1"), 1);
    }

    #[tokio::test]
    async fn test_tcp_dialer_against_local_listener() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let prober = Prober::new(
            Arc::new(TcpDialer),
            Arc::new(SilentProgress),
            fast_settings(5),
        );
        let endpoint = prober
            .probe(&ReadinessTarget::new("local", vec!["127.0.0.1".to_string()], port))
            .await
            .unwrap();

        assert_eq!(endpoint.host, "127.0.0.1");
        assert_eq!(endpoint.port, port);
    }

    #[test]
    fn test_join_host_port_brackets_ipv6() {
        assert_eq!(join_host_port("10.0.0.1", 50051), "10.0.0.1:50051");
        assert_eq!(join_host_port("::1", 34001), "[::1]:34001");
    }
}
