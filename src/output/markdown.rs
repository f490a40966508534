//! Markdown run report
//!
//! Writes a human-readable report of a run: one section per unit with its
//! status, degraded setup phases and the per-page outcome table.

use crate::output::report::{PageOutcome, RunSummary};
use crate::output::stats::collect_statistics;
use crate::output::OutputResult;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Writes the markdown report for a run
///
/// # Arguments
///
/// * `summary` - The run summary
/// * `output_path` - Path where the markdown file should be written
pub fn write_markdown_report(summary: &RunSummary, output_path: &Path) -> OutputResult<()> {
    let markdown = format_markdown_report(summary);

    let mut file = File::create(output_path)?;
    file.write_all(markdown.as_bytes())?;

    Ok(())
}

/// Formats a run summary as markdown
pub fn format_markdown_report(summary: &RunSummary) -> String {
    let stats = collect_statistics(summary);
    let mut md = String::new();

    md.push_str("# Stacks-Crawler Run Report\n\n");

    md.push_str("## Overview\n\n");
    if let Some(hash) = &summary.config_hash {
        md.push_str(&format!("- **Config Hash**: {}\n", hash));
    }
    md.push_str(&format!("- **Units**: {}\n", stats.units));
    md.push_str(&format!("- **Artifacts**: {}\n", stats.artifacts));
    md.push_str(&format!("- **Pages Completed**: {}\n", stats.pages_completed));
    md.push_str(&format!("- **Pages Failed**: {}\n", stats.pages_failed));
    md.push_str(&format!("- **Seat-Limit Waits**: {}\n", stats.contention_cycles));
    if summary.interrupted {
        md.push_str("- **Interrupted**: yes\n");
    }
    md.push('\n');

    for unit in &summary.units {
        md.push_str(&format!("## Unit {}\n\n", unit.unit_id));
        md.push_str(&format!("- **Status**: {}\n", unit.status));
        md.push_str(&format!(
            "- **Destination**: {}\n",
            unit.destination.display()
        ));
        md.push_str(&format!("- **Session State**: {}\n", unit.session_state));
        if !unit.degraded.is_empty() {
            let phases: Vec<String> = unit.degraded.iter().map(|p| p.to_string()).collect();
            md.push_str(&format!("- **Degraded**: {}\n", phases.join(", ")));
        }
        md.push_str(&format!("- **Pages Visited**: {}\n", unit.visited_count));
        md.push_str(&format!("- **Started**: {}\n", unit.started_at.to_rfc3339()));
        md.push_str(&format!(
            "- **Finished**: {}\n\n",
            unit.finished_at.to_rfc3339()
        ));

        if unit.pages.is_empty() {
            continue;
        }

        md.push_str("| Page | Outcome | Attempts | Seat-Limit Waits | Artifacts |\n");
        md.push_str("|------|---------|----------|------------------|-----------|\n");
        for page in &unit.pages {
            let (outcome, artifacts) = match &page.outcome {
                PageOutcome::Completed { artifacts } => (
                    "completed".to_string(),
                    artifacts
                        .iter()
                        .map(|a| a.file_name.as_str())
                        .collect::<Vec<_>>()
                        .join(", "),
                ),
                PageOutcome::Failed { reason } => (format!("failed: {}", reason), String::new()),
                PageOutcome::Interrupted => ("interrupted".to_string(), String::new()),
            };
            md.push_str(&format!(
                "| {} | {} | {} | {} | {} |\n",
                page.page, outcome, page.attempts, page.contention_cycles, artifacts
            ));
        }
        md.push('\n');
    }

    md
}
