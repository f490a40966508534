use crate::config::CrawlSettings;
use std::path::{Path, PathBuf};

/// One partition of crawl work, such as a publication year
///
/// Built by the orchestrator before the unit starts and never changed while it
/// runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlUnit {
    id: String,
    collection: String,
    destination: PathBuf,
    start_page: u32,
    max_visits: u32,
}

impl CrawlUnit {
    pub fn new(
        id: impl Into<String>,
        collection: impl Into<String>,
        destination_root: &Path,
        start_page: u32,
        max_visits: u32,
    ) -> Self {
        let id = id.into();
        let destination = destination_root.join(&id);
        Self {
            id,
            collection: collection.into(),
            destination,
            start_page: start_page.max(1),
            max_visits,
        }
    }

    /// Builds a unit from the crawl settings
    pub fn from_settings(id: impl Into<String>, settings: &CrawlSettings) -> Self {
        Self::new(
            id,
            settings.collection.clone(),
            &settings.destination_root,
            settings.start_page,
            settings.max_page_visits,
        )
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Directory the unit's artifacts are downloaded into
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    pub fn start_page(&self) -> u32 {
        self.start_page
    }

    pub fn max_visits(&self) -> u32 {
        self.max_visits
    }
}
