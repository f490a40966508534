//! Crawler module: the session-driven crawl engine
//!
//! This module contains the core crawling logic, including:
//! - Per-unit session setup (login, proxy hop, search, filters)
//! - Seat-limit detection and backoff
//! - Download completion detection by directory diffing
//! - Result page traversal under a visit cap
//! - Overall crawl orchestration across units

mod contention;
mod coordinator;
mod download;
mod pager;
mod session;
mod shutdown;

pub use contention::{ContentionGuard, ContentionReport};
pub use coordinator::CrawlOrchestrator;
pub use download::{Artifact, DownloadMonitor, DownloadOutcome, IN_PROGRESS_SUFFIXES};
pub use pager::{IterationReport, PageIterator, Termination};
pub use session::{SessionController, SessionSummary, SetupPhase};
pub use shutdown::{shutdown_channel, ShutdownHandle, ShutdownSignal};

use crate::config::{Config, Credentials};
use crate::output::RunSummary;
use crate::actuator::ActuatorFactory;
use crate::store::ArtifactStore;
use std::sync::Arc;

/// Runs a complete crawl over the given unit identifiers
///
/// This is the main entry point for starting a crawl. For each unit it will:
/// 1. Check the destination directory
/// 2. Open a browser session downloading into it
/// 3. Log in, reach the target system and configure the search
/// 4. Walk the result pages, downloading each one
/// 5. Close the session
pub async fn crawl(
    config: Config,
    unit_ids: &[String],
    credentials: &Credentials,
    factory: Arc<dyn ActuatorFactory>,
    store: Arc<dyn ArtifactStore>,
    shutdown: ShutdownSignal,
) -> RunSummary {
    let orchestrator = CrawlOrchestrator::new(config, factory, store, shutdown);
    let units = orchestrator.plan_units(unit_ids);
    orchestrator.run_all(&units, credentials).await
}
