//! Per-unit session setup
//!
//! Drives a fresh browser session from the portal login page to a configured
//! result listing. Phases run strictly in order; the last two are best-effort
//! and only degrade the unit when they fail.

use crate::actuator::{Actuator, ActuatorError, Condition, Element, Locator, CONDITION_POLL_INTERVAL};
use crate::config::{Config, Credentials};
use crate::crawler::shutdown::ShutdownSignal;
use crate::state::{CrawlUnit, SessionState};
use crate::store::ArtifactStore;
use crate::CrawlError;
use std::fmt;
use tokio::time::Instant;

/// Setup phases in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SetupPhase {
    Authenticate,
    ConnectToTarget,
    ConfigureSearch,
    ApplyFilter,
    SetPageSize,
}

impl fmt::Display for SetupPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Authenticate => "authenticate",
            Self::ConnectToTarget => "connect-to-target",
            Self::ConfigureSearch => "configure-search",
            Self::ApplyFilter => "apply-filter",
            Self::SetPageSize => "set-page-size",
        };
        write!(f, "{}", name)
    }
}

/// Final state of a successful setup and the phases that degraded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub state: SessionState,
    pub degraded: Vec<SetupPhase>,
}

impl SessionSummary {
    pub fn is_degraded(&self) -> bool {
        !self.degraded.is_empty()
    }
}

/// Drives the ordered setup phases for one unit
pub struct SessionController<'a> {
    actuator: &'a dyn Actuator,
    config: &'a Config,
    store: &'a dyn ArtifactStore,
    shutdown: ShutdownSignal,
    state: SessionState,
    degraded: Vec<SetupPhase>,
}

impl<'a> SessionController<'a> {
    pub fn new(
        actuator: &'a dyn Actuator,
        config: &'a Config,
        store: &'a dyn ArtifactStore,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            actuator,
            config,
            store,
            shutdown,
            state: SessionState::Init,
            degraded: Vec::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Phases that failed without ending the unit
    pub fn degraded(&self) -> &[SetupPhase] {
        &self.degraded
    }

    /// Runs every setup phase for `unit`
    ///
    /// On a fatal error the state moves to `Failed` and the error is returned;
    /// the caller must not process pages afterwards.
    pub async fn advance(
        &mut self,
        unit: &CrawlUnit,
        credentials: &Credentials,
    ) -> Result<SessionSummary, CrawlError> {
        match self.run_phases(unit, credentials).await {
            Ok(()) => Ok(SessionSummary {
                state: self.state,
                degraded: self.degraded.clone(),
            }),
            Err(e) => {
                tracing::error!("Session setup failed in state {}: {}", self.state, e);
                self.state = SessionState::Failed;
                Err(e)
            }
        }
    }

    async fn run_phases(
        &mut self,
        unit: &CrawlUnit,
        credentials: &Credentials,
    ) -> Result<(), CrawlError> {
        self.store
            .ensure_dir(unit.destination())
            .map_err(|source| CrawlError::Destination {
                path: unit.destination().to_path_buf(),
                source,
            })?;

        tracing::info!("Phase {}: logging into portal", SetupPhase::Authenticate);
        self.authenticate(credentials)
            .await
            .map_err(|e| CrawlError::Authentication(e.to_string()))
            .and_then(|outcome| outcome.map_err(CrawlError::Authentication))?;
        self.transition(SessionState::Authenticated)?;

        tracing::info!("Phase {}: reaching target system", SetupPhase::ConnectToTarget);
        self.connect_to_target().await?;
        self.transition(SessionState::Connected)?;

        tracing::info!(
            "Phase {}: searching range {}",
            SetupPhase::ConfigureSearch,
            unit.id()
        );
        self.configure_search(unit)
            .await
            .map_err(|e| CrawlError::SearchSetup(e.to_string()))
            .and_then(|outcome| outcome.map_err(CrawlError::SearchSetup))?;
        self.transition(SessionState::SearchConfigured)?;

        tracing::info!(
            "Phase {}: filtering to '{}'",
            SetupPhase::ApplyFilter,
            unit.collection()
        );
        if let Err(reason) = self.apply_filter(unit).await {
            self.degrade(SetupPhase::ApplyFilter, &reason);
        }
        self.transition(SessionState::Filtered)?;

        tracing::info!(
            "Phase {}: {} results per page",
            SetupPhase::SetPageSize,
            self.config.crawl.page_size
        );
        if let Err(reason) = self.set_page_size().await {
            self.degrade(SetupPhase::SetPageSize, &reason);
        }
        self.transition(SessionState::PageSizeSet)?;

        Ok(())
    }

    fn transition(&mut self, next: SessionState) -> Result<(), CrawlError> {
        if !self.state.can_transition_to(next) {
            return Err(CrawlError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        tracing::debug!("Session {} -> {}", self.state, next);
        self.state = next;
        Ok(())
    }

    fn degrade(&mut self, phase: SetupPhase, reason: &str) {
        tracing::warn!("Phase {} failed, continuing degraded: {}", phase, reason);
        self.degraded.push(phase);
    }

    async fn find(&self, locators: &[Locator]) -> Result<Option<Element>, ActuatorError> {
        self.actuator
            .locate(locators, self.config.timing.element_timeout())
            .await
    }

    async fn wait_for_document(&self) -> Result<(), ActuatorError> {
        if !self
            .actuator
            .wait_until(&Condition::DocumentReady, self.config.timing.navigation_timeout())
            .await?
        {
            tracing::debug!("Document did not report ready in time");
        }
        Ok(())
    }

    // ===== Authenticate =====

    /// Outer error: the actuator failed. Inner error: the portal refused us.
    async fn authenticate(
        &self,
        credentials: &Credentials,
    ) -> Result<Result<(), String>, ActuatorError> {
        let site = &self.config.site;
        let actuator = self.actuator;

        actuator.navigate_to(&site.login_url).await?;
        self.wait_for_document().await?;

        match self.find(&site.login_link).await? {
            Some(link) => {
                actuator.click(&link).await?;
                actuator
                    .wait_until(
                        &Condition::ElementPresent(site.username_field.clone()),
                        self.config.timing.navigation_timeout(),
                    )
                    .await?;
            }
            None => {
                tracing::warn!("Login link not found, using the current page as the login form");
            }
        }

        let Some(username) = self.find(&site.username_field).await? else {
            return Ok(Err("username field not found".to_string()));
        };
        actuator.type_text(&username, &credentials.username).await?;

        let Some(password) = self.find(&site.password_field).await? else {
            return Ok(Err("password field not found".to_string()));
        };
        actuator.type_text(&password, &credentials.password).await?;

        let before = actuator.current_url().await?;
        match self.find(&site.login_submit).await? {
            Some(submit) => actuator.click(&submit).await?,
            None => {
                tracing::debug!("No login submit button, pressing Enter");
                actuator.press_enter(&password).await?;
            }
        }

        // Some portals log in without leaving the page
        actuator
            .wait_until(
                &Condition::UrlChanged { from: before },
                self.config.timing.navigation_timeout(),
            )
            .await?;
        self.wait_for_document().await?;

        if !site.login_failure_markers.is_empty()
            && actuator
                .page_contains_any(&site.login_failure_markers)
                .await
                .unwrap_or(false)
        {
            return Ok(Err("portal rejected the credentials".to_string()));
        }

        tracing::info!("Logged into portal as {}", credentials.username);
        Ok(Ok(()))
    }

    // ===== Connect to target =====

    async fn connect_to_target(&self) -> Result<(), CrawlError> {
        let site = &self.config.site;

        match self.connect_via_portal().await {
            Ok(Ok(())) => {}
            Ok(Err(reason)) => {
                tracing::warn!("Portal route failed ({}), navigating directly", reason);
                self.connect_directly().await?;
            }
            Err(e) => {
                tracing::warn!("Portal route failed ({}), navigating directly", e);
                self.connect_directly().await?;
            }
        }

        match self.actuator.page_contains_any(&site.proxy_markers).await {
            Ok(true) => tracing::info!("Proxy access confirmed"),
            Ok(false) => tracing::warn!("No proxy access marker on target page"),
            Err(e) => tracing::warn!("Could not check proxy access markers: {}", e),
        }

        Ok(())
    }

    async fn connect_via_portal(&self) -> Result<Result<(), String>, ActuatorError> {
        let site = &self.config.site;
        let actuator = self.actuator;

        match self.find(&site.portal_link).await? {
            Some(link) => {
                actuator.click(&link).await?;
                self.wait_for_document().await?;
            }
            None => tracing::warn!("Database portal link not found, searching from current page"),
        }

        let Some(search) = self.find(&site.portal_search).await? else {
            return Ok(Err("portal search box not found".to_string()));
        };
        actuator.type_text(&search, &site.portal_search_term).await?;
        actuator.press_enter(&search).await?;
        self.wait_for_document().await?;

        let Some(target) = self.find(&site.target_link).await? else {
            return Ok(Err(format!(
                "no link to '{}' in portal results",
                site.portal_search_term
            )));
        };

        let handles_before = actuator.window_handles().await?;
        let url_before = actuator.current_url().await?;
        actuator.click(&target).await?;

        let switched = self.follow_new_window(&handles_before, &url_before).await?;
        if !switched && actuator.current_url().await? == url_before {
            return Ok(Err("target link did not open the target system".to_string()));
        }
        self.wait_for_document().await?;

        Ok(Ok(()))
    }

    /// Waits for either a new window or an in-place navigation
    ///
    /// Returns true if a new window appeared and became current.
    async fn follow_new_window(
        &self,
        handles_before: &[String],
        url_before: &str,
    ) -> Result<bool, ActuatorError> {
        let actuator = self.actuator;
        let deadline = Instant::now() + self.config.timing.window_switch_timeout();

        loop {
            let handles = actuator.window_handles().await?;
            if let Some(handle) = handles.iter().find(|h| !handles_before.contains(h)) {
                tracing::info!("Target opened in a new window, switching");
                actuator.switch_to_window(handle).await?;
                return Ok(true);
            }

            if actuator.current_url().await? != url_before {
                return Ok(false);
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(CONDITION_POLL_INTERVAL.min(deadline - now)).await;
        }
    }

    async fn connect_directly(&self) -> Result<(), CrawlError> {
        let url = &self.config.site.direct_target_url;
        self.actuator
            .navigate_to(url)
            .await
            .map_err(|e| CrawlError::TargetUnreachable(format!("{}: {}", url, e)))?;
        self.wait_for_document().await?;
        Ok(())
    }

    // ===== Configure search =====

    async fn configure_search(
        &self,
        unit: &CrawlUnit,
    ) -> Result<Result<(), String>, ActuatorError> {
        let site = &self.config.site;
        let actuator = self.actuator;

        let current = actuator.current_url().await?;
        let search_url = site.advanced_search_url(&current);
        tracing::debug!("Advanced search at {}", search_url);

        actuator.navigate_to(&search_url).await?;
        actuator.refresh().await?;
        self.wait_for_document().await?;

        let Some(start) = self.find(&site.range_start_field).await? else {
            return Ok(Err("range start field not found".to_string()));
        };
        actuator.type_text(&start, unit.id()).await?;

        let Some(end) = self.find(&site.range_end_field).await? else {
            return Ok(Err("range end field not found".to_string()));
        };
        actuator.type_text(&end, unit.id()).await?;

        let Some(submit) = self.find(&site.search_submit).await? else {
            return Ok(Err("search submit button not found".to_string()));
        };

        let before = actuator.current_url().await?;
        actuator.click(&submit).await?;
        if !actuator
            .wait_until(
                &Condition::UrlChanged { from: before },
                self.config.timing.navigation_timeout(),
            )
            .await?
        {
            tracing::warn!("Search submit did not change the URL");
        }
        self.wait_for_document().await?;

        Ok(Ok(()))
    }

    // ===== Best-effort refinement =====

    async fn apply_filter(&self, unit: &CrawlUnit) -> Result<(), String> {
        let site = &self.config.site;
        let actuator = self.actuator;

        let input = self
            .find(&site.filter_input)
            .await
            .map_err(|e| e.to_string())?
            .ok_or("filter input not found")?;
        actuator
            .type_text(&input, unit.collection())
            .await
            .map_err(|e| e.to_string())?;

        let option = self
            .find(&site.filter_option_locators(unit.collection()))
            .await
            .map_err(|e| e.to_string())?
            .ok_or_else(|| format!("no filter option for '{}'", unit.collection()))?;
        actuator.click(&option).await.map_err(|e| e.to_string())?;

        // Facets re-render without an observable URL change
        self.shutdown.sleep(self.config.timing.filter_settle()).await;
        self.wait_for_document().await.map_err(|e| e.to_string())?;

        Ok(())
    }

    async fn set_page_size(&self) -> Result<(), String> {
        let control = self
            .find(&self.config.site.page_size_control)
            .await
            .map_err(|e| e.to_string())?
            .ok_or("page size control not found")?;

        self.actuator
            .choose_option(&control, &self.config.crawl.page_size.to_string())
            .await
            .map_err(|e| e.to_string())?;
        self.wait_for_document().await.map_err(|e| e.to_string())?;

        Ok(())
    }
}
