//! Download completion detection
//!
//! The browser writes downloads straight into the unit's destination; the only
//! way to tell that a bulk download finished is to diff the directory against
//! the listing taken before the download was triggered.

use crate::store::ArtifactStore;
use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;
use tokio::time::Instant;

/// Suffixes browsers put on files that are still being written
pub const IN_PROGRESS_SUFFIXES: &[&str] = &[".crdownload", ".part", ".partial", ".download", ".tmp"];

/// A file that landed in the destination directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub file_name: String,
    pub size_bytes: u64,
}

/// Result of waiting for one triggered download
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// A new artifact appeared; `additional` holds any others from the same poll
    Completed {
        artifact: Artifact,
        additional: Vec<Artifact>,
    },
    /// Nothing qualifying appeared before the deadline
    TimedOut,
    /// The download could not be triggered
    ActionFailed(String),
}

impl DownloadOutcome {
    /// All artifacts of a completed download, primary first
    pub fn artifacts(&self) -> Vec<Artifact> {
        match self {
            Self::Completed {
                artifact,
                additional,
            } => std::iter::once(artifact.clone())
                .chain(additional.iter().cloned())
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// Watches a directory for newly completed downloads
pub struct DownloadMonitor<'a> {
    store: &'a dyn ArtifactStore,
    poll_interval: Duration,
    accepted_extensions: Vec<String>,
}

impl<'a> DownloadMonitor<'a> {
    pub fn new(
        store: &'a dyn ArtifactStore,
        poll_interval: Duration,
        accepted_extensions: &[String],
    ) -> Self {
        Self {
            store,
            poll_interval,
            accepted_extensions: accepted_extensions
                .iter()
                .map(|ext| ext.trim_start_matches('.').to_lowercase())
                .collect(),
        }
    }

    /// Returns true if `name` looks like a finished download
    pub fn qualifies(&self, name: &str) -> bool {
        if name.starts_with('.') {
            return false;
        }

        let lower = name.to_lowercase();
        if IN_PROGRESS_SUFFIXES
            .iter()
            .any(|suffix| lower.ends_with(suffix))
        {
            return false;
        }

        match lower.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => {
                self.accepted_extensions.iter().any(|accepted| accepted == ext)
            }
            _ => false,
        }
    }

    /// Polls `dir` until a qualifying file not in `excluded` appears
    ///
    /// Listing errors are logged and polling continues until the deadline. When
    /// several files qualify in one poll, the lexically first is the primary
    /// artifact and the rest are returned alongside it.
    pub async fn await_new_artifact(
        &self,
        dir: &Path,
        excluded: &BTreeSet<String>,
        timeout: Duration,
    ) -> DownloadOutcome {
        let deadline = Instant::now() + timeout;

        loop {
            match self.store.list_files(dir) {
                Ok(names) => {
                    let mut found: Vec<Artifact> = Vec::new();
                    // BTreeSet iteration is already lexical
                    for name in names
                        .iter()
                        .filter(|name| !excluded.contains(*name) && self.qualifies(name))
                    {
                        match self.store.file_size(dir, name) {
                            Ok(size_bytes) => found.push(Artifact {
                                file_name: name.clone(),
                                size_bytes,
                            }),
                            Err(e) => {
                                tracing::debug!("Skipping {} this poll: {}", name, e);
                            }
                        }
                    }

                    let mut found = found.into_iter();
                    if let Some(artifact) = found.next() {
                        let additional: Vec<Artifact> = found.collect();
                        if !additional.is_empty() {
                            tracing::info!(
                                "{} artifacts appeared at once, primary is {}",
                                additional.len() + 1,
                                artifact.file_name
                            );
                        }
                        return DownloadOutcome::Completed {
                            artifact,
                            additional,
                        };
                    }
                }
                Err(e) => {
                    tracing::warn!("Failed to list {}: {}", dir.display(), e);
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return DownloadOutcome::TimedOut;
            }
            tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryArtifactStore;
    use std::path::PathBuf;

    fn extensions() -> Vec<String> {
        vec!["pdf".to_string(), "zip".to_string()]
    }

    fn dir() -> PathBuf {
        PathBuf::from("/downloads/2024")
    }

    #[test]
    fn test_qualifies() {
        let store = MemoryArtifactStore::new();
        let monitor = DownloadMonitor::new(&store, Duration::from_secs(5), &extensions());

        assert!(monitor.qualifies("paper.pdf"));
        assert!(monitor.qualifies("Bulk.ZIP"));
        assert!(!monitor.qualifies("paper.pdf.crdownload"));
        assert!(!monitor.qualifies("archive.zip.part"));
        assert!(!monitor.qualifies(".com.google.Chrome.abc.pdf"));
        assert!(!monitor.qualifies("notes.txt"));
        assert!(!monitor.qualifies("pdf"));
        assert!(!monitor.qualifies(".pdf"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_file_completes() {
        let store = MemoryArtifactStore::new();
        store.add_file(&dir(), "old.pdf", 10);
        let excluded = store.snapshot(&dir()).unwrap();

        let writer = store.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(12)).await;
            writer.add_file(&dir(), "new.zip", 2048);
        });

        let monitor = DownloadMonitor::new(&store, Duration::from_secs(5), &extensions());
        let outcome = monitor
            .await_new_artifact(&dir(), &excluded, Duration::from_secs(300))
            .await;

        assert_eq!(
            outcome,
            DownloadOutcome::Completed {
                artifact: Artifact {
                    file_name: "new.zip".to_string(),
                    size_bytes: 2048,
                },
                additional: Vec::new(),
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_excluded_file_never_completes() {
        let store = MemoryArtifactStore::new();
        store.add_file(&dir(), "old.pdf", 10);
        let excluded = store.snapshot(&dir()).unwrap();

        let monitor = DownloadMonitor::new(&store, Duration::from_secs(5), &extensions());
        let started = Instant::now();
        let outcome = monitor
            .await_new_artifact(&dir(), &excluded, Duration::from_secs(60))
            .await;

        assert_eq!(outcome, DownloadOutcome::TimedOut);
        assert!(started.elapsed() >= Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_progress_file_is_ignored_until_renamed() {
        let store = MemoryArtifactStore::new();
        store.ensure_dir(&dir()).unwrap();
        let excluded = BTreeSet::new();

        let writer = store.clone();
        tokio::spawn(async move {
            writer.add_file(&dir(), "bulk.zip.crdownload", 100);
            tokio::time::sleep(Duration::from_secs(20)).await;
            writer.remove_file(&dir(), "bulk.zip.crdownload");
            writer.add_file(&dir(), "bulk.zip", 4096);
        });

        let monitor = DownloadMonitor::new(&store, Duration::from_secs(5), &extensions());
        let outcome = monitor
            .await_new_artifact(&dir(), &excluded, Duration::from_secs(300))
            .await;

        assert_eq!(outcome.artifacts()[0].file_name, "bulk.zip");
        assert_eq!(outcome.artifacts()[0].size_bytes, 4096);
    }

    #[tokio::test(start_paused = true)]
    async fn test_multiple_new_files_are_all_reported() {
        let store = MemoryArtifactStore::new();
        store.add_file(&dir(), "b.pdf", 2);
        store.add_file(&dir(), "a.pdf", 1);

        let monitor = DownloadMonitor::new(&store, Duration::from_secs(5), &extensions());
        let outcome = monitor
            .await_new_artifact(&dir(), &BTreeSet::new(), Duration::from_secs(30))
            .await;

        let names: Vec<String> = outcome
            .artifacts()
            .into_iter()
            .map(|artifact| artifact.file_name)
            .collect();
        assert_eq!(names, vec!["a.pdf", "b.pdf"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_listing_errors_poll_until_deadline() {
        let store = MemoryArtifactStore::new();
        let missing = PathBuf::from("/never/created");

        let monitor = DownloadMonitor::new(&store, Duration::from_secs(5), &extensions());
        let outcome = monitor
            .await_new_artifact(&missing, &BTreeSet::new(), Duration::from_secs(15))
            .await;

        assert_eq!(outcome, DownloadOutcome::TimedOut);
    }
}
