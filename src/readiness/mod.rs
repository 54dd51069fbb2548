//! Network readiness detection for a freshly started backend.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────────┐
//! │                     ReadinessCoordinator                            │
//! │                                                                     │
//! │   await_all([bootstrapper, rpcServer])                              │
//! │         │                                                           │
//! │         ├──────────────────────────┐                                │
//! │         ▼                          ▼                                │
//! │   ┌──────────────┐          ┌──────────────┐                        │
//! │   │ Prober       │          │ Prober       │   one task per target  │
//! │   │ bootstrapper │          │ rpcServer    │                        │
//! │   └──────────────┘          └──────────────┘                        │
//! │     │         │               │         │     one task per          │
//! │     ▼         ▼               ▼         ▼     candidate address     │
//! │  host IP  container IP     host IP  container IP                    │
//! │                                                                     │
//! │   first candidate to answer wins; first target to time out fails    │
//! └────────────────────────────────────────────────────────────────────┘
//! ```

pub mod coordinator;
pub mod probe;
pub mod progress;

pub use coordinator::ReadinessCoordinator;
pub use probe::{Dialer, Prober, TcpDialer, join_host_port};
pub use progress::{DotProgress, ProbeAttempt, ProbeObserver, SilentProgress};

/// A named endpoint that must accept connections before testing starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadinessTarget {
    pub name: String,
    /// Addresses to race against each other, e.g. the Docker host and the
    /// container's own IP.
    pub candidates: Vec<String>,
    pub port: u16,
}

impl ReadinessTarget {
    /// Build a target. Duplicate and empty candidates are dropped.
    pub fn new(name: impl Into<String>, candidates: Vec<String>, port: u16) -> Self {
        let mut unique: Vec<String> = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            if !candidate.is_empty() && !unique.contains(&candidate) {
                unique.push(candidate);
            }
        }
        Self {
            name: name.into(),
            candidates: unique,
            port,
        }
    }
}

/// The candidate that answered for a target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredEndpoint {
    pub target: String,
    pub host: String,
    pub port: u16,
}

impl std::fmt::Display for DiscoveredEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&join_host_port(&self.host, self.port))
    }
}
