//! Seat-limit detection and backoff
//!
//! The remote system signals that its concurrent-user capacity is exhausted by
//! showing one of a small set of phrases. The guard waits and refreshes until
//! the phrases disappear or its attempts run out.

use crate::actuator::Actuator;
use crate::crawler::shutdown::ShutdownSignal;
use crate::state::ContentionState;
use std::time::Duration;

/// What a single `check_and_wait` call did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentionReport {
    /// The last check found no contention
    pub cleared: bool,
    /// Page checks performed
    pub checks: u32,
    /// Wait-and-refresh cycles performed
    pub cycles: u32,
    /// Shutdown was requested while waiting
    pub interrupted: bool,
}

/// Detects and backs off from the remote seat limit
#[derive(Debug, Clone)]
pub struct ContentionGuard {
    phrases: Vec<String>,
    wait: Duration,
    max_attempts: u32,
    shutdown: ShutdownSignal,
}

impl ContentionGuard {
    pub fn new(
        phrases: Vec<String>,
        wait: Duration,
        max_attempts: u32,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            phrases,
            wait,
            max_attempts: max_attempts.max(1),
            shutdown,
        }
    }

    /// Returns true if the current page shows a contention phrase
    ///
    /// A page that cannot be read counts as not contended.
    pub async fn detect(&self, actuator: &dyn Actuator) -> bool {
        match actuator.page_contains_any(&self.phrases).await {
            Ok(found) => found,
            Err(e) => {
                tracing::debug!("Could not read page for seat-limit check: {}", e);
                false
            }
        }
    }

    /// Checks for contention, waiting and refreshing while it persists
    ///
    /// Check `k` happens on attempt `k`. If all `max_attempts` checks detect
    /// contention, exactly `max_attempts` wait-and-refresh cycles are performed
    /// and the report is not `cleared`.
    pub async fn check_and_wait(&self, actuator: &dyn Actuator) -> ContentionReport {
        let mut state = ContentionState::new(self.max_attempts, self.wait);
        let mut report = ContentionReport {
            cleared: false,
            checks: 0,
            cycles: 0,
            interrupted: false,
        };

        while state.begin_attempt() {
            report.checks = state.attempt;

            if !self.detect(actuator).await {
                report.cleared = true;
                if report.cycles > 0 {
                    tracing::info!("Seat limit cleared after {} wait cycle(s)", report.cycles);
                }
                return report;
            }

            tracing::warn!(
                "Seat limit detected ({}/{}), waiting {:?}",
                state.attempt,
                state.max_attempts,
                state.backoff
            );

            if !self.shutdown.sleep(state.backoff).await {
                report.interrupted = true;
                return report;
            }

            if let Err(e) = actuator.refresh().await {
                tracing::warn!("Refresh after seat-limit wait failed: {}", e);
            }
            report.cycles += 1;
        }

        tracing::warn!(
            "Seat limit persisted through {} attempt(s)",
            state.max_attempts
        );
        report
    }
}
