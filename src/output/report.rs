//! Per-unit and per-page outcome records

use crate::crawler::{Artifact, SetupPhase};
use crate::state::SessionState;
use chrono::{DateTime, Utc};
use std::fmt;
use std::path::PathBuf;

/// How a unit ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitStatus {
    /// The result set ended naturally
    Completed,
    /// Stopped at the page-visit cap with results remaining
    SafetyCap,
    /// A fatal error ended the unit
    Fatal { reason: String },
    /// Shutdown was requested while the unit ran
    Interrupted,
}

impl UnitStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed | Self::SafetyCap)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::SafetyCap => "safety cap",
            Self::Fatal { .. } => "fatal",
            Self::Interrupted => "interrupted",
        }
    }
}

impl fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fatal { reason } => write!(f, "fatal: {}", reason),
            other => write!(f, "{}", other.label()),
        }
    }
}

/// Outcome of one result page
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageOutcome {
    Completed { artifacts: Vec<Artifact> },
    Failed { reason: String },
    Interrupted,
}

/// One entry of the per-page outcome stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageReport {
    pub page: u32,
    pub outcome: PageOutcome,
    /// Page attempts made, including the successful one
    pub attempts: u32,
    /// Seat-limit wait cycles spent on this page
    pub contention_cycles: u32,
}

impl PageReport {
    pub fn artifact_count(&self) -> usize {
        match &self.outcome {
            PageOutcome::Completed { artifacts } => artifacts.len(),
            _ => 0,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self.outcome, PageOutcome::Completed { .. })
    }
}

/// Everything recorded about one unit
#[derive(Debug, Clone)]
pub struct UnitReport {
    pub unit_id: String,
    pub destination: PathBuf,
    pub status: UnitStatus,
    pub session_state: SessionState,
    pub degraded: Vec<SetupPhase>,
    pub pages: Vec<PageReport>,
    pub visited_count: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl UnitReport {
    pub fn artifact_count(&self) -> usize {
        self.pages.iter().map(PageReport::artifact_count).sum()
    }

    pub fn duration_seconds(&self) -> i64 {
        (self.finished_at - self.started_at).num_seconds()
    }
}

/// Outcomes of a whole run
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub units: Vec<UnitReport>,
    /// Units were skipped because shutdown was requested
    pub interrupted: bool,
    pub config_hash: Option<String>,
}

impl RunSummary {
    pub fn total_artifacts(&self) -> usize {
        self.units.iter().map(UnitReport::artifact_count).sum()
    }

    pub fn failed_units(&self) -> usize {
        self.units
            .iter()
            .filter(|unit| matches!(unit.status, UnitStatus::Fatal { .. }))
            .count()
    }

    /// True if every unit finished normally or at the safety cap
    pub fn all_succeeded(&self) -> bool {
        !self.interrupted && self.units.iter().all(|unit| unit.status.is_success())
    }
}
