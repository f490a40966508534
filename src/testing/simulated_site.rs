//! Scriptable stand-in for the remote portal and target system
//!
//! Every UI element is addressed by a role name; the matching site profile
//! uses `#role` CSS locators. The site models just enough of the real flow
//! (login, proxy hop, advanced search, paged results with a bulk download
//! dialog) to drive the crawl core end to end, and records what the driver
//! did so tests can assert on it.

use crate::actuator::{
    Actuator, ActuatorError, ActuatorFactory, ActuatorResult, Element, Locator, Strategy,
};
use crate::config::SiteProfile;
use crate::testing::MemoryArtifactStore;
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub const PORTAL_URL: &str = "https://portal.test/";
pub const TARGET_HOME_URL: &str = "https://target.test/Xplore/home.jsp";
pub const ADVANCED_SEARCH_URL: &str = "https://target.test/search/advanced";

const LOGIN_FORM_URL: &str = "https://portal.test/login";
const PORTAL_HOME_URL: &str = "https://portal.test/main";
const DATABASES_URL: &str = "https://portal.test/databases";
const DATABASE_SEARCH_URL: &str = "https://portal.test/databases/search";

const CONTENTION_TEXT: &str = "Seat limit reached: too many users are connected";
const LOGIN_FAILURE_TEXT: &str = "Invalid credentials, please try again";
const PROXY_TEXT: &str = "Access provided by Test University Library";

#[derive(Debug, Clone, PartialEq, Eq)]
enum View {
    Blank,
    Portal,
    LoginForm,
    PortalHome,
    Databases,
    DatabaseSearch,
    TargetHome,
    AdvancedSearch,
    Results { page: u32 },
    Elsewhere(String),
}

impl View {
    fn url(&self) -> String {
        match self {
            Self::Blank => "about:blank".to_string(),
            Self::Portal => PORTAL_URL.to_string(),
            Self::LoginForm => LOGIN_FORM_URL.to_string(),
            Self::PortalHome => PORTAL_HOME_URL.to_string(),
            Self::Databases => DATABASES_URL.to_string(),
            Self::DatabaseSearch => DATABASE_SEARCH_URL.to_string(),
            Self::TargetHome => TARGET_HOME_URL.to_string(),
            Self::AdvancedSearch => ADVANCED_SEARCH_URL.to_string(),
            Self::Results { page } => format!("https://target.test/search/results?page={}", page),
            Self::Elsewhere(url) => url.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DownloadStage {
    Idle,
    ChoosingFormat,
    Confirming,
    Done,
}

/// Fixed behaviour chosen when the site is built
#[derive(Debug, Default)]
struct Script {
    pages: u32,
    missing: BTreeSet<String>,
    login_rejected: bool,
    new_window: bool,
    failing_page_source: bool,
    panic_on_click: Option<String>,
    failing_clicks: BTreeSet<String>,
    failing_navigations: BTreeSet<String>,
}

#[derive(Debug)]
struct SiteState {
    windows: Vec<(String, View)>,
    current: usize,
    closed: bool,
    logged_in: bool,
    selected: bool,
    stage: DownloadStage,
    filter_text: Option<String>,
    banner: Option<String>,
    download_dir: PathBuf,
    page_size: Option<String>,

    contention: BTreeMap<u32, u32>,
    failing_downloads: BTreeMap<u32, u32>,
    failing_opens: u32,
    file_seq: u32,

    typed: Vec<(String, String)>,
    clicks: Vec<String>,
    navigations: Vec<String>,
    visited: Vec<u32>,
    refreshes: u32,
    downloads_triggered: u32,
    sessions_opened: u32,
    sessions_closed: u32,
}

impl SiteState {
    fn view(&self) -> &View {
        &self.windows[self.current].1
    }

    fn set_view(&mut self, view: View) {
        if let View::Results { page } = view {
            self.visited.push(page);
            self.selected = false;
            self.stage = DownloadStage::Idle;
        }
        self.windows[self.current].1 = view;
    }

    fn results_page(&self) -> Option<u32> {
        match self.view() {
            View::Results { page } => Some(*page),
            _ => None,
        }
    }

    fn ensure_open(&self) -> ActuatorResult<()> {
        if self.closed {
            Err(ActuatorError::SessionClosed)
        } else {
            Ok(())
        }
    }
}

/// Builder for [`SimulatedSite`]
#[derive(Debug, Default)]
pub struct SimulatedSiteBuilder {
    script: Script,
    contention: BTreeMap<u32, u32>,
    failing_downloads: BTreeMap<u32, u32>,
    failing_opens: u32,
    store: Option<MemoryArtifactStore>,
    download_dir: Option<PathBuf>,
}

impl SimulatedSiteBuilder {
    /// Number of result pages the search returns
    pub fn pages(mut self, pages: u32) -> Self {
        self.script.pages = pages;
        self
    }

    /// Shows the seat-limit message on `page` until it has been refreshed `times` times
    pub fn contention_on_page(mut self, page: u32, times: u32) -> Self {
        self.contention.insert(page, times);
        self
    }

    pub fn persistent_contention_on_page(self, page: u32) -> Self {
        self.contention_on_page(page, u32::MAX)
    }

    /// The first `times` downloads confirmed on `page` never produce a file
    pub fn failing_downloads_on_page(mut self, page: u32, times: u32) -> Self {
        self.failing_downloads.insert(page, times);
        self
    }

    /// Removes an element role from every view
    pub fn without(mut self, role: &str) -> Self {
        self.script.missing.insert(role.to_string());
        self
    }

    pub fn login_rejected(mut self) -> Self {
        self.script.login_rejected = true;
        self
    }

    /// The target link opens the target system in a second window
    pub fn target_opens_new_window(mut self) -> Self {
        self.script.new_window = true;
        self
    }

    pub fn failing_page_source(mut self) -> Self {
        self.script.failing_page_source = true;
        self
    }

    /// Clicking the role returns an error while the element stays present
    pub fn failing_click(mut self, role: &str) -> Self {
        self.script.failing_clicks.insert(role.to_string());
        self
    }

    /// Navigating to the URL returns an error
    pub fn failing_navigation_to(mut self, url: &str) -> Self {
        self.script.failing_navigations.insert(url.to_string());
        self
    }

    /// Clicking the role panics
    pub fn panic_on_click(mut self, role: &str) -> Self {
        self.script.panic_on_click = Some(role.to_string());
        self
    }

    /// The first `times` session opens fail
    pub fn failing_opens(mut self, times: u32) -> Self {
        self.failing_opens = times;
        self
    }

    /// Store that confirmed downloads are written into
    pub fn store(mut self, store: MemoryArtifactStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn download_dir(mut self, dir: &Path) -> Self {
        self.download_dir = Some(dir.to_path_buf());
        self
    }

    pub fn build(self) -> SimulatedSite {
        let mut script = self.script;
        script.pages = script.pages.max(1);

        let state = SiteState {
            windows: vec![("window-1".to_string(), View::Blank)],
            current: 0,
            closed: false,
            logged_in: false,
            selected: false,
            stage: DownloadStage::Idle,
            filter_text: None,
            banner: None,
            download_dir: self
                .download_dir
                .unwrap_or_else(|| PathBuf::from("/downloads")),
            page_size: None,
            contention: self.contention,
            failing_downloads: self.failing_downloads,
            failing_opens: self.failing_opens,
            file_seq: 0,
            typed: Vec::new(),
            clicks: Vec::new(),
            navigations: Vec::new(),
            visited: Vec::new(),
            refreshes: 0,
            downloads_triggered: 0,
            sessions_opened: 0,
            sessions_closed: 0,
        };

        SimulatedSite {
            script: Arc::new(script),
            state: Arc::new(Mutex::new(state)),
            store: self.store.unwrap_or_default(),
        }
    }
}

/// In-process actuator and actuator factory over a scripted site
#[derive(Debug, Clone)]
pub struct SimulatedSite {
    script: Arc<Script>,
    state: Arc<Mutex<SiteState>>,
    store: MemoryArtifactStore,
}

impl SimulatedSite {
    pub fn builder() -> SimulatedSiteBuilder {
        SimulatedSiteBuilder::default()
    }

    /// Site profile addressing this site's elements
    pub fn profile() -> SiteProfile {
        let role = |name: &str| vec![Locator::css(format!("#{}", name))];

        SiteProfile {
            login_url: PORTAL_URL.to_string(),
            login_link: role("login-link"),
            username_field: role("username"),
            password_field: role("password"),
            login_submit: role("login-submit"),
            login_failure_markers: vec!["invalid credentials".to_string()],
            portal_link: role("portal-link"),
            portal_search: role("portal-search"),
            portal_search_term: "IEEE".to_string(),
            target_link: role("target-link"),
            direct_target_url: TARGET_HOME_URL.to_string(),
            proxy_markers: vec!["Access provided by".to_string()],
            default_base_url: "https://target.test".to_string(),
            base_path_marker: "/Xplore".to_string(),
            advanced_search_path: "/search/advanced".to_string(),
            range_start_field: role("range-start"),
            range_end_field: role("range-end"),
            search_submit: role("search-submit"),
            filter_input: role("filter-input"),
            filter_option: role("filter-{name}"),
            page_size_control: role("page-size"),
            select_all: role("select-all"),
            download_button: role("download-button"),
            format_option: role("format-option"),
            download_confirm: role("download-confirm"),
            dialog_close: role("dialog-close"),
            next_page: role("page-{page}"),
            ..SiteProfile::default()
        }
    }

    fn state(&self) -> MutexGuard<'_, SiteState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ===== Test hooks =====

    /// Jumps straight to a result page, as if setup had already run
    pub fn show_results_page(&self, page: u32) {
        self.state().set_view(View::Results { page });
    }

    /// Extra text shown on every page
    pub fn set_banner(&self, text: &str) {
        self.state().banner = Some(text.to_string());
    }

    pub fn set_download_dir(&self, dir: &Path) {
        self.state().download_dir = dir.to_path_buf();
    }

    pub fn preselect_all(&self) {
        self.state().selected = true;
    }

    // ===== Observations =====

    pub fn refresh_count(&self) -> u32 {
        self.state().refreshes
    }

    /// Result pages shown, in order
    pub fn visited_pages(&self) -> Vec<u32> {
        self.state().visited.clone()
    }

    pub fn current_results_page(&self) -> Option<u32> {
        self.state().results_page()
    }

    pub fn downloads_triggered(&self) -> u32 {
        self.state().downloads_triggered
    }

    pub fn sessions_opened(&self) -> u32 {
        self.state().sessions_opened
    }

    pub fn sessions_closed(&self) -> u32 {
        self.state().sessions_closed
    }

    /// Text typed into the role, in order
    pub fn typed(&self, role: &str) -> Vec<String> {
        self.state()
            .typed
            .iter()
            .filter(|(r, _)| r == role)
            .map(|(_, text)| text.clone())
            .collect()
    }

    pub fn click_count(&self, role: &str) -> usize {
        self.state().clicks.iter().filter(|r| *r == role).count()
    }

    pub fn chosen_page_size(&self) -> Option<String> {
        self.state().page_size.clone()
    }

    pub fn navigations(&self) -> Vec<String> {
        self.state().navigations.clone()
    }

    pub fn window_count(&self) -> usize {
        self.state().windows.len()
    }

    // ===== Model =====

    fn role_of(locator: &Locator) -> Option<&str> {
        match locator.by {
            Strategy::Css => locator.value.strip_prefix('#'),
            _ => None,
        }
    }

    fn present(&self, state: &SiteState, role: &str) -> bool {
        if self.script.missing.contains(role) {
            return false;
        }

        match state.view() {
            View::Portal => role == "login-link",
            View::LoginForm => matches!(role, "username" | "password" | "login-submit"),
            View::PortalHome => role == "portal-link",
            View::Databases => role == "portal-search",
            View::DatabaseSearch => matches!(role, "portal-search" | "target-link"),
            View::AdvancedSearch => matches!(role, "range-start" | "range-end" | "search-submit"),
            View::Results { .. } => self.present_on_results(state, role),
            View::Blank | View::TargetHome | View::Elsewhere(_) => false,
        }
    }

    fn present_on_results(&self, state: &SiteState, role: &str) -> bool {
        if let Some(page) = role.strip_prefix("page-").and_then(|p| p.parse::<u32>().ok()) {
            return page >= 1 && page <= self.script.pages;
        }
        if let Some(name) = role.strip_prefix("filter-") {
            if name == "input" {
                return true;
            }
            return state.filter_text.as_deref() == Some(name);
        }

        match role {
            "page-size" | "select-all" | "download-button" => true,
            "format-option" => state.stage == DownloadStage::ChoosingFormat,
            "download-confirm" => state.stage == DownloadStage::Confirming,
            "dialog-close" => state.stage == DownloadStage::Done,
            _ => false,
        }
    }

    fn submit_login(&self, state: &mut SiteState) {
        if self.script.login_rejected {
            state.banner = Some(LOGIN_FAILURE_TEXT.to_string());
            return;
        }
        state.logged_in = true;
        state.set_view(View::PortalHome);
    }

    fn confirm_download(&self, state: &mut SiteState) {
        state.downloads_triggered += 1;
        state.stage = DownloadStage::Done;

        let Some(page) = state.results_page() else {
            return;
        };

        if let Some(remaining) = state.failing_downloads.get_mut(&page) {
            if *remaining > 0 {
                *remaining -= 1;
                return;
            }
        }

        state.file_seq += 1;
        let name = format!("results-p{:03}-{:03}.zip", page, state.file_seq);
        self.store.add_file(&state.download_dir, &name, 1024 * u64::from(page));
    }
}

#[async_trait]
impl Actuator for SimulatedSite {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn find_first(&self, locators: &[Locator]) -> ActuatorResult<Option<Element>> {
        let state = self.state();
        state.ensure_open()?;
        Ok(locators
            .iter()
            .filter_map(Self::role_of)
            .find(|role| self.present(&state, role))
            .map(Element::new))
    }

    async fn click(&self, element: &Element) -> ActuatorResult<()> {
        let role = element.id();
        if self.script.panic_on_click.as_deref() == Some(role) {
            panic!("simulated failure clicking {}", role);
        }

        let mut state = self.state();
        state.ensure_open()?;
        if !self.present(&state, role) {
            return Err(ActuatorError::StaleElement(role.to_string()));
        }
        if self.script.failing_clicks.contains(role) {
            return Err(ActuatorError::Protocol {
                error: "element click intercepted".to_string(),
                message: format!("{} is covered by another element", role),
            });
        }
        state.clicks.push(role.to_string());

        match role {
            "login-link" => state.set_view(View::LoginForm),
            "login-submit" => self.submit_login(&mut state),
            "portal-link" => state.set_view(View::Databases),
            "target-link" => {
                if self.script.new_window {
                    let handle = format!("window-{}", state.windows.len() + 1);
                    state.windows.push((handle, View::TargetHome));
                } else {
                    state.set_view(View::TargetHome);
                }
            }
            "search-submit" => state.set_view(View::Results { page: 1 }),
            "select-all" => state.selected = !state.selected,
            "download-button" => state.stage = DownloadStage::ChoosingFormat,
            "format-option" => state.stage = DownloadStage::Confirming,
            "download-confirm" => self.confirm_download(&mut state),
            "dialog-close" => state.stage = DownloadStage::Idle,
            other => {
                if let Some(page) = other.strip_prefix("page-").and_then(|p| p.parse().ok()) {
                    state.set_view(View::Results { page });
                }
            }
        }
        Ok(())
    }

    async fn type_text(&self, element: &Element, text: &str) -> ActuatorResult<()> {
        let mut state = self.state();
        state.ensure_open()?;
        let role = element.id().to_string();
        if role == "filter-input" {
            state.filter_text = Some(text.to_string());
        }
        state.typed.push((role, text.to_string()));
        Ok(())
    }

    async fn press_enter(&self, element: &Element) -> ActuatorResult<()> {
        let mut state = self.state();
        state.ensure_open()?;
        match element.id() {
            "password" => self.submit_login(&mut state),
            "portal-search" => state.set_view(View::DatabaseSearch),
            _ => {}
        }
        Ok(())
    }

    async fn is_selected(&self, element: &Element) -> ActuatorResult<bool> {
        let state = self.state();
        state.ensure_open()?;
        Ok(element.id() == "select-all" && state.selected)
    }

    async fn choose_option(&self, element: &Element, value: &str) -> ActuatorResult<()> {
        let mut state = self.state();
        state.ensure_open()?;
        if element.id() == "page-size" {
            state.page_size = Some(value.to_string());
        }
        Ok(())
    }

    async fn navigate_to(&self, url: &str) -> ActuatorResult<()> {
        let mut state = self.state();
        state.ensure_open()?;
        state.navigations.push(url.to_string());
        if self.script.failing_navigations.contains(url) {
            return Err(ActuatorError::Navigation {
                url: url.to_string(),
                reason: "net::ERR_CONNECTION_REFUSED".to_string(),
            });
        }

        let view = match url {
            PORTAL_URL if state.logged_in => View::PortalHome,
            PORTAL_URL => View::Portal,
            TARGET_HOME_URL => View::TargetHome,
            ADVANCED_SEARCH_URL => View::AdvancedSearch,
            other => View::Elsewhere(other.to_string()),
        };
        state.set_view(view);
        Ok(())
    }

    async fn refresh(&self) -> ActuatorResult<()> {
        let mut state = self.state();
        state.ensure_open()?;
        state.refreshes += 1;

        if let Some(page) = state.results_page() {
            if let Some(remaining) = state.contention.get_mut(&page) {
                *remaining = remaining.saturating_sub(1);
            }
            state.selected = false;
            state.stage = DownloadStage::Idle;
        }
        Ok(())
    }

    async fn current_url(&self) -> ActuatorResult<String> {
        let state = self.state();
        state.ensure_open()?;
        Ok(state.view().url())
    }

    async fn page_source(&self) -> ActuatorResult<String> {
        if self.script.failing_page_source {
            return Err(ActuatorError::UnexpectedResponse(
                "page source unavailable".to_string(),
            ));
        }

        let state = self.state();
        state.ensure_open()?;

        let mut source = format!("<html><body data-view=\"{:?}\">", state.view());
        if let Some(banner) = &state.banner {
            source.push_str(banner);
        }
        if *state.view() == View::TargetHome {
            source.push_str(PROXY_TEXT);
        }
        if let Some(page) = state.results_page() {
            if state.contention.get(&page).copied().unwrap_or(0) > 0 {
                source.push_str(CONTENTION_TEXT);
            }
        }
        source.push_str("</body></html>");
        Ok(source)
    }

    async fn window_handles(&self) -> ActuatorResult<Vec<String>> {
        let state = self.state();
        state.ensure_open()?;
        Ok(state.windows.iter().map(|(handle, _)| handle.clone()).collect())
    }

    async fn switch_to_window(&self, handle: &str) -> ActuatorResult<()> {
        let mut state = self.state();
        state.ensure_open()?;
        let index = state
            .windows
            .iter()
            .position(|(h, _)| h == handle)
            .ok_or_else(|| ActuatorError::NoSuchWindow(handle.to_string()))?;
        state.current = index;
        Ok(())
    }

    async fn close(&self) -> ActuatorResult<()> {
        let mut state = self.state();
        state.ensure_open()?;
        state.closed = true;
        state.sessions_closed += 1;
        Ok(())
    }
}

#[async_trait]
impl ActuatorFactory for SimulatedSite {
    async fn open(&self, download_dir: &Path) -> ActuatorResult<Box<dyn Actuator>> {
        {
            let mut state = self.state();
            if state.failing_opens > 0 {
                state.failing_opens -= 1;
                return Err(ActuatorError::UnexpectedResponse(
                    "simulated session start failure".to_string(),
                ));
            }

            state.sessions_opened += 1;
            state.windows = vec![("window-1".to_string(), View::Blank)];
            state.current = 0;
            state.closed = false;
            state.logged_in = false;
            state.selected = false;
            state.stage = DownloadStage::Idle;
            state.filter_text = None;
            state.banner = None;
            state.download_dir = download_dir.to_path_buf();
        }

        Ok(Box::new(self.clone()))
    }
}
