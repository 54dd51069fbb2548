//! Progress reporting for readiness probes.
//!
//! Observers only ever see attempts. Whatever they do, including failing,
//! has no effect on the outcome of a probe.

use std::io::Write;
use std::panic::AssertUnwindSafe;

/// One connection attempt against one candidate address.
#[derive(Debug, Clone, Copy)]
pub struct ProbeAttempt<'a> {
    /// Readiness target the attempt belongs to.
    pub target: &'a str,
    /// Candidate address being dialed.
    pub host: &'a str,
    pub port: u16,
    /// 1-based attempt number for this candidate.
    pub attempt: u32,
}

/// Receives a callback for every probe attempt.
pub trait ProbeObserver: Send + Sync {
    fn on_attempt(&self, attempt: &ProbeAttempt<'_>) -> std::io::Result<()>;
}

/// Prints a dot per attempt, the runner's animated wait indicator.
#[derive(Debug, Default)]
pub struct DotProgress;

impl ProbeObserver for DotProgress {
    fn on_attempt(&self, _attempt: &ProbeAttempt<'_>) -> std::io::Result<()> {
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(b".")?;
        stdout.flush()
    }
}

/// Discards attempts.
#[derive(Debug, Default)]
pub struct SilentProgress;

impl ProbeObserver for SilentProgress {
    fn on_attempt(&self, _attempt: &ProbeAttempt<'_>) -> std::io::Result<()> {
        Ok(())
    }
}

/// Notify `observer`, logging instead of propagating any failure or panic.
pub(crate) fn notify(observer: &dyn ProbeObserver, attempt: &ProbeAttempt<'_>) {
    match std::panic::catch_unwind(AssertUnwindSafe(|| observer.on_attempt(attempt))) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::trace!(
            "Progress observer failed on {} attempt {}: {}",
            attempt.target,
            attempt.attempt,
            e
        ),
        Err(_) => tracing::trace!(
            "Progress observer panicked on {} attempt {}",
            attempt.target,
            attempt.attempt
        ),
    }
}
