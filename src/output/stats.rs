//! Console statistics for a finished run

use crate::output::report::{PageOutcome, RunSummary, UnitStatus};

/// Aggregate counters over a run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStatistics {
    pub units: usize,
    pub units_completed: usize,
    pub units_capped: usize,
    pub units_failed: usize,
    pub units_interrupted: usize,
    pub pages_completed: usize,
    pub pages_failed: usize,
    pub contention_cycles: u32,
    pub page_retries: u32,
    pub artifacts: usize,
    pub bytes: u64,
}

/// Computes run statistics from the unit reports
pub fn collect_statistics(summary: &RunSummary) -> RunStatistics {
    let mut stats = RunStatistics {
        units: summary.units.len(),
        ..RunStatistics::default()
    };

    for unit in &summary.units {
        match unit.status {
            UnitStatus::Completed => stats.units_completed += 1,
            UnitStatus::SafetyCap => stats.units_capped += 1,
            UnitStatus::Fatal { .. } => stats.units_failed += 1,
            UnitStatus::Interrupted => stats.units_interrupted += 1,
        }

        for page in &unit.pages {
            stats.contention_cycles += page.contention_cycles;
            stats.page_retries += page.attempts.saturating_sub(1);
            match &page.outcome {
                PageOutcome::Completed { artifacts } => {
                    stats.pages_completed += 1;
                    stats.artifacts += artifacts.len();
                    stats.bytes += artifacts.iter().map(|a| a.size_bytes).sum::<u64>();
                }
                PageOutcome::Failed { .. } => stats.pages_failed += 1,
                PageOutcome::Interrupted => {}
            }
        }
    }

    stats
}

/// Prints the run summary to stdout in a formatted manner
pub fn print_run_summary(summary: &RunSummary) {
    let stats = collect_statistics(summary);

    println!("=== Crawl Summary ===\n");

    println!("Units:");
    for unit in &summary.units {
        println!(
            "  {}: {} ({} page(s), {} artifact(s), {}s)",
            unit.unit_id,
            unit.status,
            unit.visited_count,
            unit.artifact_count(),
            unit.duration_seconds()
        );
        if !unit.degraded.is_empty() {
            let phases: Vec<String> = unit.degraded.iter().map(|p| p.to_string()).collect();
            println!("    degraded: {}", phases.join(", "));
        }
    }
    println!();

    println!("Overview:");
    println!("  Units: {}", stats.units);
    println!("    completed: {}", stats.units_completed);
    println!("    safety cap: {}", stats.units_capped);
    println!("    failed: {}", stats.units_failed);
    println!("    interrupted: {}", stats.units_interrupted);
    println!("  Pages completed: {}", stats.pages_completed);
    println!("  Pages failed: {}", stats.pages_failed);
    println!("  Page retries: {}", stats.page_retries);
    println!("  Seat-limit waits: {}", stats.contention_cycles);
    println!(
        "  Artifacts: {} ({:.1} MiB)",
        stats.artifacts,
        stats.bytes as f64 / (1024.0 * 1024.0)
    );

    if summary.interrupted {
        println!();
        println!("Run was interrupted before every unit finished.");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::Artifact;
    use crate::output::report::{PageReport, UnitReport};
    use crate::state::SessionState;
    use chrono::Utc;
    use std::path::PathBuf;

    #[test]
    fn test_collect_statistics() {
        let now = Utc::now();
        let pages = vec![
            PageReport {
                page: 1,
                outcome: PageOutcome::Completed {
                    artifacts: vec![Artifact {
                        file_name: "a.zip".to_string(),
                        size_bytes: 100,
                    }],
                },
                attempts: 2,
                contention_cycles: 1,
            },
            PageReport {
                page: 2,
                outcome: PageOutcome::Failed {
                    reason: "timeout".to_string(),
                },
                attempts: 3,
                contention_cycles: 0,
            },
        ];
        let summary = RunSummary {
            units: vec![UnitReport {
                unit_id: "2024".to_string(),
                destination: PathBuf::from("/d/2024"),
                status: UnitStatus::Fatal {
                    reason: "page 2".to_string(),
                },
                session_state: SessionState::PageSizeSet,
                degraded: Vec::new(),
                pages,
                visited_count: 1,
                started_at: now,
                finished_at: now,
            }],
            interrupted: false,
            config_hash: None,
        };

        let stats = collect_statistics(&summary);
        assert_eq!(stats.units_failed, 1);
        assert_eq!(stats.pages_completed, 1);
        assert_eq!(stats.pages_failed, 1);
        assert_eq!(stats.page_retries, 3);
        assert_eq!(stats.contention_cycles, 1);
        assert_eq!(stats.artifacts, 1);
        assert_eq!(stats.bytes, 100);
    }
}
