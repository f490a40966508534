//! Configuration module for Stacks-Crawler
//!
//! This module handles loading, parsing, and validating TOML configuration
//! files, the site profile that locates elements on the remote interface, and
//! portal credentials.
//!
//! # Example
//!
//! ```no_run
//! use stacks_crawler::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("crawl.toml")).unwrap();
//! println!("Safety cap per unit: {}", config.crawl.max_page_visits);
//! ```

mod credentials;
mod parser;
mod site;
mod types;
mod validation;

// Re-export types
pub use credentials::{load_credentials, resolve_credentials, Credentials, DEFAULT_CREDENTIALS_FILE};
pub use site::{SiteProfile, NAME_PLACEHOLDER, PAGE_PLACEHOLDER};
pub use types::{BrowserConfig, Config, CrawlSettings, PageFailurePolicy, TimingConfig};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_from_str, load_config_with_hash};
pub use validation::validate_unit_id;
