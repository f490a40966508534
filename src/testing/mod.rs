//! Test doubles for the crawl core
//!
//! This module contains:
//! - `SimulatedSite`: a scriptable actuator and actuator factory
//! - `MemoryArtifactStore`: an artifact store kept in memory
//! - `test_config`: a configuration wired to the simulated site

mod memory_store;
mod simulated_site;

pub use memory_store::MemoryArtifactStore;
pub use simulated_site::{
    SimulatedSite, SimulatedSiteBuilder, ADVANCED_SEARCH_URL, PORTAL_URL, TARGET_HOME_URL,
};

use crate::config::{
    BrowserConfig, Config, CrawlSettings, PageFailurePolicy, TimingConfig,
};
use std::path::PathBuf;

/// Collection name used by [`test_config`]
pub const TEST_COLLECTION: &str = "Journal of Tests";

/// Destination root used by [`test_config`]
pub const TEST_DESTINATION_ROOT: &str = "/downloads";

/// Configuration pointing at [`SimulatedSite::profile`] with default timings
pub fn test_config() -> Config {
    Config {
        crawl: CrawlSettings {
            collection: TEST_COLLECTION.to_string(),
            destination_root: PathBuf::from(TEST_DESTINATION_ROOT),
            units: Vec::new(),
            start_page: 1,
            max_page_visits: 100,
            page_size: 10,
            accepted_extensions: vec!["pdf".to_string(), "zip".to_string()],
            on_page_failure: PageFailurePolicy::Abort,
        },
        timing: TimingConfig::default(),
        browser: BrowserConfig::default(),
        site: SimulatedSite::profile(),
    }
}
