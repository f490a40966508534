//! Crawl orchestration
//!
//! Runs one unit after another. Every unit gets a fresh browser session whose
//! downloads land in the unit's destination; the session is closed on every
//! exit path, and a unit that errors or panics is recorded without stopping
//! the units after it.

use crate::actuator::{Actuator, ActuatorFactory};
use crate::config::{Config, Credentials};
use crate::crawler::pager::{PageIterator, Termination};
use crate::crawler::session::SessionController;
use crate::crawler::shutdown::ShutdownSignal;
use crate::output::{RunSummary, UnitReport, UnitStatus};
use crate::state::{CrawlUnit, PageCursor, SessionState};
use crate::store::ArtifactStore;
use crate::CrawlError;
use chrono::Utc;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::Instrument;

/// Top-level driver composing session setup and page traversal per unit
pub struct CrawlOrchestrator {
    config: Arc<Config>,
    factory: Arc<dyn ActuatorFactory>,
    store: Arc<dyn ArtifactStore>,
    shutdown: ShutdownSignal,
}

impl CrawlOrchestrator {
    pub fn new(
        config: Config,
        factory: Arc<dyn ActuatorFactory>,
        store: Arc<dyn ArtifactStore>,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            config: Arc::new(config),
            factory,
            store,
            shutdown,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Builds the units for the given identifiers
    pub fn plan_units(&self, ids: &[String]) -> Vec<CrawlUnit> {
        ids.iter()
            .map(|id| CrawlUnit::from_settings(id.clone(), &self.config.crawl))
            .collect()
    }

    /// Runs every unit in order and collects their reports
    pub async fn run_all(&self, units: &[CrawlUnit], credentials: &Credentials) -> RunSummary {
        let mut summary = RunSummary::default();

        for (index, unit) in units.iter().enumerate() {
            if self.shutdown.is_triggered() {
                tracing::warn!(
                    "Shutdown requested, {} unit(s) not started",
                    units.len() - index
                );
                summary.interrupted = true;
                break;
            }

            if index > 0 {
                let pacing = self.config.timing.unit_pacing();
                tracing::info!("Pausing {:?} before unit {}", pacing, unit.id());
                if !self.shutdown.sleep(pacing).await {
                    summary.interrupted = true;
                    break;
                }
            }

            let span = tracing::info_span!("unit", id = %unit.id());
            let report = self.run_unit(unit, credentials).instrument(span).await;
            if report.status == UnitStatus::Interrupted {
                summary.interrupted = true;
            }
            summary.units.push(report);
        }

        tracing::info!(
            "Run finished: {} unit(s), {} artifact(s), {} failed",
            summary.units.len(),
            summary.total_artifacts(),
            summary.failed_units()
        );
        summary
    }

    /// Runs a single unit from destination checks to session teardown
    pub async fn run_unit(&self, unit: &CrawlUnit, credentials: &Credentials) -> UnitReport {
        let started_at = Utc::now();
        tracing::info!(
            "Starting unit {} into {}",
            unit.id(),
            unit.destination().display()
        );

        let mut report = UnitReport {
            unit_id: unit.id().to_string(),
            destination: unit.destination().to_path_buf(),
            status: UnitStatus::Interrupted,
            session_state: SessionState::Init,
            degraded: Vec::new(),
            pages: Vec::new(),
            visited_count: 0,
            started_at,
            finished_at: started_at,
        };

        let status = match self.open_session(unit).await {
            Err(e) => fatal(e),
            Ok(actuator) => {
                let drive = self.drive(unit, credentials, actuator.as_ref(), &mut report);
                let result = AssertUnwindSafe(drive).catch_unwind().await;

                if let Err(e) = actuator.close().await {
                    tracing::warn!("Closing browser session failed: {}", e);
                }

                match result {
                    Ok(Ok(status)) => status,
                    Ok(Err(e)) => fatal(e),
                    Err(payload) => fatal(CrawlError::Panicked(panic_message(payload.as_ref()))),
                }
            }
        };

        report.status = status;
        report.finished_at = Utc::now();
        tracing::info!(
            "Unit {} finished: {} ({} page(s), {} artifact(s))",
            unit.id(),
            report.status,
            report.visited_count,
            report.artifact_count()
        );
        report
    }

    async fn open_session(&self, unit: &CrawlUnit) -> Result<Box<dyn Actuator>, CrawlError> {
        let destination = unit.destination();
        self.store
            .ensure_dir(destination)
            .and_then(|_| self.store.check_writable(destination))
            .map_err(|source| CrawlError::Destination {
                path: destination.to_path_buf(),
                source,
            })?;

        let actuator = self
            .factory
            .open(destination)
            .await
            .map_err(CrawlError::SessionInit)?;
        tracing::debug!("Opened {} session", actuator.name());
        Ok(actuator)
    }

    async fn drive(
        &self,
        unit: &CrawlUnit,
        credentials: &Credentials,
        actuator: &dyn Actuator,
        report: &mut UnitReport,
    ) -> Result<UnitStatus, CrawlError> {
        let mut controller = SessionController::new(
            actuator,
            &self.config,
            self.store.as_ref(),
            self.shutdown.clone(),
        );
        let setup = controller.advance(unit, credentials).await;
        report.session_state = controller.state();
        report.degraded = controller.degraded().to_vec();
        let summary = setup?;
        if !summary.state.is_ready() {
            return Err(CrawlError::SearchSetup(format!(
                "session stopped in state {}",
                summary.state
            )));
        }

        let iterator = PageIterator::new(
            actuator,
            &self.config,
            self.store.as_ref(),
            self.shutdown.clone(),
        );
        let iteration = iterator
            .run(unit, PageCursor::new(unit.start_page()))
            .await;

        report.visited_count = iteration.cursor.visited_count();
        report.pages = iteration.pages;

        let status = match iteration.termination {
            Termination::EndOfResults => UnitStatus::Completed,
            Termination::SafetyCap => UnitStatus::SafetyCap,
            Termination::Interrupted => UnitStatus::Interrupted,
            Termination::PageFailed { page, reason } => {
                return Err(CrawlError::PageRetriesExhausted {
                    page,
                    attempts: self.config.timing.max_page_retries,
                    reason,
                })
            }
            Termination::AdvanceFailed { page, reason } => UnitStatus::Fatal {
                reason: format!("could not move to page {}: {}", page, reason),
            },
        };
        Ok(status)
    }
}

fn fatal(error: CrawlError) -> UnitStatus {
    tracing::error!("Unit failed: {}", error);
    UnitStatus::Fatal {
        reason: error.to_string(),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{test_config, MemoryArtifactStore, SimulatedSite};
    use std::path::Path;

    fn credentials() -> Credentials {
        Credentials::new("alice", "secret").unwrap()
    }

    fn orchestrator(site: &SimulatedSite, store: &MemoryArtifactStore) -> CrawlOrchestrator {
        CrawlOrchestrator::new(
            test_config(),
            Arc::new(site.clone()),
            Arc::new(store.clone()),
            ShutdownSignal::never(),
        )
    }

    #[test]
    fn test_plan_units_uses_destination_root() {
        let site = SimulatedSite::builder().build();
        let store = MemoryArtifactStore::new();
        let units = orchestrator(&site, &store).plan_units(&["2023".to_string(), "2024".to_string()]);

        assert_eq!(units.len(), 2);
        assert_eq!(units[1].destination(), Path::new("/downloads/2024"));
        assert_eq!(units[1].collection(), "Journal of Tests");
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_closed_after_success() {
        let store = MemoryArtifactStore::new();
        let site = SimulatedSite::builder().pages(2).store(store.clone()).build();
        let orchestrator = orchestrator(&site, &store);
        let units = orchestrator.plan_units(&["2024".to_string()]);

        let summary = orchestrator.run_all(&units, &credentials()).await;

        assert_eq!(summary.units[0].status, UnitStatus::Completed);
        assert_eq!(summary.total_artifacts(), 2);
        assert_eq!(site.sessions_opened(), 1);
        assert_eq!(site.sessions_closed(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_failure_is_fatal_for_that_unit_only() {
        let store = MemoryArtifactStore::new();
        let site = SimulatedSite::builder()
            .pages(1)
            .store(store.clone())
            .failing_opens(1)
            .build();
        let orchestrator = orchestrator(&site, &store);
        let units = orchestrator.plan_units(&["2023".to_string(), "2024".to_string()]);

        let summary = orchestrator.run_all(&units, &credentials()).await;

        assert!(matches!(summary.units[0].status, UnitStatus::Fatal { .. }));
        assert_eq!(summary.units[1].status, UnitStatus::Completed);
        assert_eq!(site.sessions_closed(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unwritable_destination_skips_session() {
        let store = MemoryArtifactStore::new();
        store.make_unwritable(Path::new("/downloads/2024"));
        let site = SimulatedSite::builder().pages(1).store(store.clone()).build();
        let orchestrator = orchestrator(&site, &store);
        let units = orchestrator.plan_units(&["2024".to_string()]);

        let summary = orchestrator.run_all(&units, &credentials()).await;

        assert!(matches!(summary.units[0].status, UnitStatus::Fatal { .. }));
        assert_eq!(site.sessions_opened(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panic_is_contained_and_session_closed() {
        let store = MemoryArtifactStore::new();
        let site = SimulatedSite::builder()
            .pages(2)
            .store(store.clone())
            .panic_on_click("download-confirm")
            .build();
        let orchestrator = orchestrator(&site, &store);
        let units = orchestrator.plan_units(&["2024".to_string()]);

        let summary = orchestrator.run_all(&units, &credentials()).await;

        match &summary.units[0].status {
            UnitStatus::Fatal { reason } => assert!(reason.contains("panicked")),
            other => panic!("expected fatal status, got {:?}", other),
        }
        assert_eq!(summary.units[0].session_state, SessionState::PageSizeSet);
        assert_eq!(site.sessions_closed(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pacing_between_units() {
        let store = MemoryArtifactStore::new();
        let site = SimulatedSite::builder().pages(1).store(store.clone()).build();
        let orchestrator = orchestrator(&site, &store);
        let units = orchestrator.plan_units(&["2023".to_string(), "2024".to_string()]);

        let started = tokio::time::Instant::now();
        let summary = orchestrator.run_all(&units, &credentials()).await;

        assert!(summary.all_succeeded());
        assert!(started.elapsed() >= orchestrator.config().timing.unit_pacing());
        assert_eq!(store.files_in(Path::new("/downloads/2023")).len(), 1);
        assert_eq!(store.files_in(Path::new("/downloads/2024")).len(), 1);
    }
}
