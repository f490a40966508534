//! Stacks-Crawler: a session-driven document harvester
//!
//! This crate drives an authenticated, paginated search interface reached
//! through a library proxy: it logs in, hops to the target system, configures
//! a search for one partition (e.g. a publication year), then walks the result
//! pages and triggers a bulk download on each one. It tolerates the remote
//! seat limit and detects download completion by watching the destination
//! directory.

pub mod actuator;
pub mod config;
pub mod crawler;
pub mod output;
pub mod state;
pub mod store;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for crawl operations
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Browser automation error: {0}")]
    Actuator(#[from] actuator::ActuatorError),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Target system unreachable: {0}")]
    TargetUnreachable(String),

    #[error("Search configuration failed: {0}")]
    SearchSetup(String),

    #[error("Destination {path} is not usable: {source}")]
    Destination {
        path: PathBuf,
        source: store::StoreError,
    },

    #[error("Browser session could not be opened: {0}")]
    SessionInit(actuator::ActuatorError),

    #[error("Page {page} failed after {attempts} attempts: {reason}")]
    PageRetriesExhausted {
        page: u32,
        attempts: u32,
        reason: String,
    },

    #[error("Invalid session transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: state::SessionState,
        to: state::SessionState,
    },

    #[error("Crawl unit panicked: {0}")]
    Panicked(String),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid locator: {0}")]
    InvalidLocator(String),

    #[error("Credentials error: {0}")]
    Credentials(String),
}

/// Result type alias for crawl operations
pub type Result<T> = std::result::Result<T, CrawlError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::{Config, Credentials};
pub use crawler::CrawlOrchestrator;
pub use state::{CrawlUnit, PageCursor, SessionState};
