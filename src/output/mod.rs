//! Output module for run reports
//!
//! This module handles:
//! - The per-unit and per-page outcome records
//! - Printing a run summary to stdout
//! - Writing a markdown report

mod markdown;
mod report;
pub mod stats;

pub use markdown::{format_markdown_report, write_markdown_report};
pub use report::{PageOutcome, PageReport, RunSummary, UnitReport, UnitStatus};
pub use stats::{collect_statistics, print_run_summary, RunStatistics};

use thiserror::Error;

/// Errors that can occur while writing output
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;
