use crate::config::site::SiteProfile;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for Stacks-Crawler
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crawl: CrawlSettings,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub site: SiteProfile,
}

/// What to crawl and where to put it
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CrawlSettings {
    /// Journal or collection the results are filtered to
    pub collection: String,

    /// Root directory; each unit downloads into `<root>/<unit id>`
    pub destination_root: PathBuf,

    /// Unit identifiers (e.g. years) to crawl when none are given on the command line
    #[serde(default)]
    pub units: Vec<String>,

    /// Result page to start each unit on
    #[serde(default = "default_start_page")]
    pub start_page: u32,

    /// Safety cap on pages visited per unit
    #[serde(default = "default_max_page_visits")]
    pub max_page_visits: u32,

    /// Results per page requested from the remote system
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// File extensions accepted as finished downloads
    #[serde(default = "default_accepted_extensions")]
    pub accepted_extensions: Vec<String>,

    /// What to do with a page that keeps failing after every retry
    #[serde(default)]
    pub on_page_failure: PageFailurePolicy,
}

/// Policy for a page that exhausted its retries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageFailurePolicy {
    /// End the unit
    #[default]
    Abort,
    /// Log the page as failed and move on to the next one
    Skip,
}

/// Waits, timeouts and retry bounds (seconds unless noted)
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct TimingConfig {
    /// How long to poll for a single element before treating it as absent
    pub element_timeout_secs: u64,

    /// How long to wait for a navigation to produce an observable change
    pub navigation_timeout_secs: u64,

    /// How long to wait for a newly opened window to appear
    pub window_switch_timeout_secs: u64,

    /// Wait before re-checking a page that reported a seat limit
    pub contention_wait_secs: u64,

    /// Seat-limit checks per page attempt
    pub contention_max_attempts: u32,

    /// How long to wait for a triggered download to land on disk
    pub download_timeout_secs: u64,

    /// Interval between download directory listings
    pub download_poll_secs: u64,

    /// Cooldown before a failed page is retried from scratch
    pub page_retry_cooldown_secs: u64,

    /// Attempts per page before the page-failure policy applies
    pub max_page_retries: u32,

    /// How long to look for the next page button before concluding the results ended
    pub next_page_search_secs: u64,

    /// Fixed settle time after applying the collection filter
    pub filter_settle_secs: u64,

    /// Lower bound of the randomised pause after a completed page
    pub settle_min_secs: u64,

    /// Upper bound of the randomised pause after a completed page
    pub settle_max_secs: u64,

    /// Pause between crawl units
    pub unit_pacing_secs: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            element_timeout_secs: 10,
            navigation_timeout_secs: 20,
            window_switch_timeout_secs: 15,
            contention_wait_secs: 300,
            contention_max_attempts: 5,
            download_timeout_secs: 300,
            download_poll_secs: 5,
            page_retry_cooldown_secs: 600,
            max_page_retries: 3,
            next_page_search_secs: 10,
            filter_settle_secs: 5,
            settle_min_secs: 5,
            settle_max_secs: 15,
            unit_pacing_secs: 30,
        }
    }
}

impl TimingConfig {
    pub fn element_timeout(&self) -> Duration {
        Duration::from_secs(self.element_timeout_secs)
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }

    pub fn window_switch_timeout(&self) -> Duration {
        Duration::from_secs(self.window_switch_timeout_secs)
    }

    pub fn contention_wait(&self) -> Duration {
        Duration::from_secs(self.contention_wait_secs)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    pub fn download_poll(&self) -> Duration {
        Duration::from_secs(self.download_poll_secs)
    }

    pub fn page_retry_cooldown(&self) -> Duration {
        Duration::from_secs(self.page_retry_cooldown_secs)
    }

    pub fn next_page_search(&self) -> Duration {
        Duration::from_secs(self.next_page_search_secs)
    }

    pub fn filter_settle(&self) -> Duration {
        Duration::from_secs(self.filter_settle_secs)
    }

    pub fn unit_pacing(&self) -> Duration {
        Duration::from_secs(self.unit_pacing_secs)
    }
}

/// WebDriver endpoint and browser options
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct BrowserConfig {
    /// URL of the chromedriver-compatible WebDriver endpoint
    pub webdriver_url: String,

    /// Run without a visible window; unset means headless everywhere but Windows
    pub headless: Option<bool>,

    /// WebDriver `browserName` capability
    pub browser_name: String,

    /// Page load timeout handed to the browser
    pub page_load_timeout_secs: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            webdriver_url: "http://localhost:9515".to_string(),
            headless: None,
            browser_name: "chrome".to_string(),
            page_load_timeout_secs: 60,
        }
    }
}

impl BrowserConfig {
    /// Resolves the headless flag, defaulting from the host OS
    pub fn is_headless(&self) -> bool {
        self.headless.unwrap_or(!cfg!(windows))
    }
}

fn default_start_page() -> u32 {
    1
}

fn default_max_page_visits() -> u32 {
    100
}

fn default_page_size() -> u32 {
    10
}

fn default_accepted_extensions() -> Vec<String> {
    vec!["pdf".to_string(), "zip".to_string()]
}
