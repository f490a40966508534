//! Result page traversal
//!
//! Each page goes through: seat-limit check, select all, trigger the bulk
//! download, wait for the artifact. A failed page is retried from scratch
//! after a long cooldown. Pages are visited in increasing order and never
//! revisited.

use crate::actuator::{Actuator, Condition, Element, Locator};
use crate::config::{Config, PageFailurePolicy};
use crate::crawler::contention::ContentionGuard;
use crate::crawler::download::{Artifact, DownloadMonitor, DownloadOutcome};
use crate::crawler::shutdown::ShutdownSignal;
use crate::output::{PageOutcome, PageReport};
use crate::state::{CrawlUnit, PageCursor};
use crate::store::ArtifactStore;
use std::time::Duration;

/// How long to look for the download dialog's close button
const DIALOG_CLOSE_TIMEOUT: Duration = Duration::from_secs(3);

/// Why the page loop stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    /// No control for the next page exists
    EndOfResults,
    /// The visit cap was reached with more pages available
    SafetyCap,
    /// A page exhausted its retries under the abort policy
    PageFailed { page: u32, reason: String },
    /// The next page control was found but could not be used
    AdvanceFailed { page: u32, reason: String },
    /// Shutdown was requested
    Interrupted,
}

/// Result of driving the page loop for one unit
#[derive(Debug, Clone)]
pub struct IterationReport {
    pub cursor: PageCursor,
    pub termination: Termination,
    pub pages: Vec<PageReport>,
}

enum AttemptError {
    Failed(String),
    Interrupted,
}

enum Advance {
    Moved(u32),
    End,
    Failed(String),
    Interrupted,
}

/// Walks the result pages of a configured session
pub struct PageIterator<'a> {
    actuator: &'a dyn Actuator,
    config: &'a Config,
    store: &'a dyn ArtifactStore,
    guard: ContentionGuard,
    monitor: DownloadMonitor<'a>,
    shutdown: ShutdownSignal,
}

impl<'a> PageIterator<'a> {
    pub fn new(
        actuator: &'a dyn Actuator,
        config: &'a Config,
        store: &'a dyn ArtifactStore,
        shutdown: ShutdownSignal,
    ) -> Self {
        let timing = &config.timing;
        let guard = ContentionGuard::new(
            config.site.contention_phrases.clone(),
            timing.contention_wait(),
            timing.contention_max_attempts,
            shutdown.clone(),
        );
        let monitor = DownloadMonitor::new(
            store,
            timing.download_poll(),
            &config.crawl.accepted_extensions,
        );

        Self {
            actuator,
            config,
            store,
            guard,
            monitor,
            shutdown,
        }
    }

    /// Processes pages from `cursor` until the results end, the cap is hit,
    /// a page fails under the abort policy, or shutdown is requested
    pub async fn run(&self, unit: &CrawlUnit, cursor: PageCursor) -> IterationReport {
        let mut cursor = cursor;
        let mut pages = Vec::new();

        let first = cursor.current_page();
        if first > 1 && cursor.visited_count() == 0 {
            tracing::info!("Jumping to start page {}", first);
            match self.go_to(first).await {
                Advance::Moved(_) => {}
                Advance::End => {
                    tracing::warn!("Start page {} does not exist", first);
                    return IterationReport {
                        cursor,
                        termination: Termination::EndOfResults,
                        pages,
                    };
                }
                Advance::Failed(reason) => {
                    return IterationReport {
                        cursor,
                        termination: Termination::AdvanceFailed {
                            page: first,
                            reason,
                        },
                        pages,
                    };
                }
                Advance::Interrupted => {
                    return IterationReport {
                        cursor,
                        termination: Termination::Interrupted,
                        pages,
                    };
                }
            }
        }

        let termination = loop {
            if cursor.at_cap(unit.max_visits()) {
                break self.probe_at_cap(cursor.current_page()).await;
            }

            if self.shutdown.is_triggered() {
                tracing::info!("Shutdown requested, stopping before page {}", cursor.current_page());
                break Termination::Interrupted;
            }

            let page = cursor.current_page();
            let report = self.process_page(unit, page).await;
            let outcome = report.outcome.clone();
            pages.push(report);

            match outcome {
                PageOutcome::Completed { .. } => cursor.record_visit(),
                PageOutcome::Interrupted => break Termination::Interrupted,
                PageOutcome::Failed { reason } => match self.config.crawl.on_page_failure {
                    PageFailurePolicy::Abort => {
                        tracing::error!("Page {} failed, aborting unit: {}", page, reason);
                        break Termination::PageFailed { page, reason };
                    }
                    PageFailurePolicy::Skip => {
                        tracing::warn!("Page {} failed, skipping it: {}", page, reason);
                        cursor.record_visit();
                    }
                },
            }

            if cursor.at_cap(unit.max_visits()) {
                continue;
            }

            if self.shutdown.is_triggered() {
                tracing::info!("Shutdown requested, not moving past page {}", page);
                break Termination::Interrupted;
            }

            match self.advance(page).await {
                Advance::Moved(next) => cursor.advance_to(next),
                Advance::End => {
                    tracing::info!("No page {} control, results ended", page + 1);
                    break Termination::EndOfResults;
                }
                Advance::Failed(reason) => {
                    tracing::error!("Could not move to page {}: {}", page + 1, reason);
                    break Termination::AdvanceFailed {
                        page: page + 1,
                        reason,
                    };
                }
                Advance::Interrupted => break Termination::Interrupted,
            }
        };

        tracing::info!(
            "Page loop ended after {} visit(s): {:?}",
            cursor.visited_count(),
            termination
        );

        IterationReport {
            cursor,
            termination,
            pages,
        }
    }

    /// Distinguishes "results ended exactly at the cap" from "cap reached"
    async fn probe_at_cap(&self, page: u32) -> Termination {
        let next = self.config.site.next_page_locators(page + 1);
        match self
            .actuator
            .locate(&next, self.config.timing.next_page_search())
            .await
        {
            Ok(None) => Termination::EndOfResults,
            Ok(Some(_)) => {
                tracing::warn!("Safety cap reached with page {} still available", page + 1);
                Termination::SafetyCap
            }
            Err(e) => {
                tracing::warn!("Could not probe for page {}: {}", page + 1, e);
                Termination::SafetyCap
            }
        }
    }

    /// Processes one page, retrying after a cooldown up to the retry bound
    async fn process_page(&self, unit: &CrawlUnit, page: u32) -> PageReport {
        let timing = &self.config.timing;
        let mut contention_cycles = 0;
        let mut reason = String::new();

        for attempt in 1..=timing.max_page_retries {
            if attempt > 1 {
                tracing::info!(
                    "Retrying page {} in {:?} (attempt {}/{})",
                    page,
                    timing.page_retry_cooldown(),
                    attempt,
                    timing.max_page_retries
                );
                if !self.shutdown.sleep(timing.page_retry_cooldown()).await {
                    return PageReport {
                        page,
                        outcome: PageOutcome::Interrupted,
                        attempts: attempt - 1,
                        contention_cycles,
                    };
                }
                if let Err(e) = self.actuator.refresh().await {
                    tracing::warn!("Refresh before retry failed: {}", e);
                }
            }

            match self.attempt_page(unit, page, &mut contention_cycles).await {
                Ok(artifacts) => {
                    tracing::info!(
                        "Page {} done: {}",
                        page,
                        artifacts
                            .iter()
                            .map(|a| format!("{} ({} bytes)", a.file_name, a.size_bytes))
                            .collect::<Vec<_>>()
                            .join(", ")
                    );
                    if !self.settle().await {
                        tracing::debug!("Settle after page {} cut short by shutdown", page);
                    }
                    return PageReport {
                        page,
                        outcome: PageOutcome::Completed { artifacts },
                        attempts: attempt,
                        contention_cycles,
                    };
                }
                Err(AttemptError::Interrupted) => {
                    return PageReport {
                        page,
                        outcome: PageOutcome::Interrupted,
                        attempts: attempt,
                        contention_cycles,
                    };
                }
                Err(AttemptError::Failed(why)) => {
                    tracing::warn!(
                        "Page {} attempt {}/{} failed: {}",
                        page,
                        attempt,
                        timing.max_page_retries,
                        why
                    );
                    reason = why;
                }
            }
        }

        PageReport {
            page,
            outcome: PageOutcome::Failed { reason },
            attempts: timing.max_page_retries,
            contention_cycles,
        }
    }

    async fn attempt_page(
        &self,
        unit: &CrawlUnit,
        page: u32,
        contention_cycles: &mut u32,
    ) -> Result<Vec<Artifact>, AttemptError> {
        let contention = self.guard.check_and_wait(self.actuator).await;
        *contention_cycles += contention.cycles;
        if contention.interrupted {
            return Err(AttemptError::Interrupted);
        }
        if !contention.cleared {
            return Err(AttemptError::Failed(format!(
                "seat limit persisted through {} check(s)",
                contention.checks
            )));
        }

        self.select_all().await.map_err(AttemptError::Failed)?;

        let excluded = self
            .store
            .snapshot(unit.destination())
            .map_err(|e| AttemptError::Failed(format!("snapshot failed: {}", e)))?;

        let outcome = match self.trigger_download().await {
            Ok(()) => {
                self.monitor
                    .await_new_artifact(
                        unit.destination(),
                        &excluded,
                        self.config.timing.download_timeout(),
                    )
                    .await
            }
            Err(reason) => DownloadOutcome::ActionFailed(reason),
        };

        match outcome {
            DownloadOutcome::Completed { .. } => {
                self.close_dialog().await;
                Ok(outcome.artifacts())
            }
            DownloadOutcome::TimedOut => Err(AttemptError::Failed(format!(
                "no artifact on page {} within {:?}",
                page,
                self.config.timing.download_timeout()
            ))),
            DownloadOutcome::ActionFailed(reason) => Err(AttemptError::Failed(reason)),
        }
    }

    async fn find(&self, locators: &[Locator], what: &str) -> Result<Element, String> {
        self.actuator
            .locate(locators, self.config.timing.element_timeout())
            .await
            .map_err(|e| format!("{}: {}", what, e))?
            .ok_or_else(|| format!("{} not found", what))
    }

    /// Selects every result on the page; a no-op if already selected
    async fn select_all(&self) -> Result<(), String> {
        let checkbox = self.find(&self.config.site.select_all, "select-all control").await?;
        let selected = self
            .actuator
            .is_selected(&checkbox)
            .await
            .map_err(|e| e.to_string())?;
        if !selected {
            self.actuator
                .click(&checkbox)
                .await
                .map_err(|e| e.to_string())?;
        }
        Ok(())
    }

    async fn trigger_download(&self) -> Result<(), String> {
        let site = &self.config.site;
        for (locators, what) in [
            (&site.download_button, "download button"),
            (&site.format_option, "format option"),
            (&site.download_confirm, "download confirm"),
        ] {
            let element = self.find(locators, what).await?;
            self.actuator
                .click(&element)
                .await
                .map_err(|e| format!("{}: {}", what, e))?;
        }
        Ok(())
    }

    async fn close_dialog(&self) {
        let locators = &self.config.site.dialog_close;
        if locators.is_empty() {
            return;
        }
        match self.actuator.locate(locators, DIALOG_CLOSE_TIMEOUT).await {
            Ok(Some(button)) => {
                if let Err(e) = self.actuator.click(&button).await {
                    tracing::debug!("Closing download dialog failed: {}", e);
                }
            }
            Ok(None) => {}
            Err(e) => tracing::debug!("Looking for download dialog failed: {}", e),
        }
    }

    /// Randomised pause after a completed page; false when cut short by shutdown
    async fn settle(&self) -> bool {
        let timing = &self.config.timing;
        let secs = fastrand::u64(timing.settle_min_secs..=timing.settle_max_secs);
        self.shutdown.sleep(Duration::from_secs(secs)).await
    }

    async fn advance(&self, page: u32) -> Advance {
        let contention = self.guard.check_and_wait(self.actuator).await;
        if contention.interrupted {
            return Advance::Interrupted;
        }
        if !contention.cleared {
            tracing::warn!("Seat limit still shown, trying page {} anyway", page + 1);
        }

        self.go_to(page + 1).await
    }

    /// Clicks the control for `target` and waits for the page to load
    async fn go_to(&self, target: u32) -> Advance {
        let locators = self.config.site.next_page_locators(target);
        let button = match self
            .actuator
            .locate(&locators, self.config.timing.next_page_search())
            .await
        {
            Ok(Some(button)) => button,
            Ok(None) => return Advance::End,
            Err(e) => return Advance::Failed(e.to_string()),
        };

        let before = match self.actuator.current_url().await {
            Ok(url) => url,
            Err(e) => return Advance::Failed(e.to_string()),
        };
        if let Err(e) = self.actuator.click(&button).await {
            return Advance::Failed(e.to_string());
        }

        match self
            .actuator
            .wait_until(
                &Condition::UrlChanged { from: before },
                self.config.timing.navigation_timeout(),
            )
            .await
        {
            Ok(true) => {}
            Ok(false) => tracing::debug!("URL unchanged after moving to page {}", target),
            Err(e) => return Advance::Failed(e.to_string()),
        }
        if let Err(e) = self
            .actuator
            .wait_until(&Condition::DocumentReady, self.config.timing.navigation_timeout())
            .await
        {
            return Advance::Failed(e.to_string());
        }

        tracing::info!("Moved to page {}", target);
        Advance::Moved(target)
    }
}
