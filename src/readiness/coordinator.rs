//! Multi-target readiness.
//!
//! One [`Prober`] per target runs concurrently. The coordinator succeeds only
//! once every target has answered and fails on the first target that gives up.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use tokio::task::JoinSet;

use crate::error::ReadinessError;
use crate::readiness::probe::Prober;
use crate::readiness::{DiscoveredEndpoint, ReadinessTarget};

/// Waits for a set of readiness targets.
#[derive(Clone)]
pub struct ReadinessCoordinator {
    prober: Prober,
    deadline: Option<Duration>,
}

impl ReadinessCoordinator {
    pub fn new(prober: Prober) -> Self {
        Self {
            prober,
            deadline: None,
        }
    }

    /// Bound the whole wait by wall-clock time in addition to the per-target
    /// attempt budgets.
    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    /// Probe all `targets`, returning one endpoint per target name.
    ///
    /// Fails with the first target error. Remaining probes are aborted and
    /// no partial result is returned.
    pub async fn await_all(
        &self,
        targets: Vec<ReadinessTarget>,
    ) -> Result<HashMap<String, DiscoveredEndpoint>, ReadinessError> {
        let mut statuses: BTreeMap<String, bool> =
            targets.iter().map(|t| (t.name.clone(), false)).collect();
        let mut found = HashMap::with_capacity(targets.len());

        let mut probes = JoinSet::new();
        for target in targets {
            let prober = self.prober.clone();
            probes.spawn(async move { prober.probe(&target).await });
        }

        let collect = async {
            while let Some(joined) = probes.join_next().await {
                let outcome = match joined {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        tracing::warn!("Readiness task failed: {}", e);
                        continue;
                    }
                };

                match outcome {
                    Ok(endpoint) => {
                        statuses.insert(endpoint.target.clone(), true);
                        found.insert(endpoint.target.clone(), endpoint);
                    }
                    Err(ReadinessError::Timeout {
                        target, attempts, ..
                    }) => {
                        probes.abort_all();
                        return Err(ReadinessError::Timeout {
                            target,
                            attempts,
                            statuses: statuses.clone(),
                        });
                    }
                    Err(other) => {
                        probes.abort_all();
                        return Err(other);
                    }
                }
            }
            Ok(())
        };

        let collected = match self.deadline {
            Some(deadline) => match tokio::time::timeout(deadline, collect).await {
                Ok(result) => result,
                Err(_) => Err(ReadinessError::Deadline {
                    deadline,
                    statuses: statuses.clone(),
                }),
            },
            None => collect.await,
        };
        collected?;

        if found.len() < statuses.len() {
            // A probe task panicked or was cancelled; treat its target as closed.
            let (target, _) = statuses
                .iter()
                .find(|(_, open)| !**open)
                .map(|(name, open)| (name.clone(), *open))
                .unwrap_or_default();
            return Err(ReadinessError::Timeout {
                target,
                attempts: self.prober.settings().max_attempts,
                statuses,
            });
        }

        Ok(found)
    }
}
