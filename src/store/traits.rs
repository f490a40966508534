//! Artifact store traits and error types
//!
//! The crawl core only ever lists directories and reads file sizes; artifact
//! content is never inspected.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur during artifact store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),
}

impl StoreError {
    pub fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Result type for artifact store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Trait for the place downloaded artifacts land
///
/// Implementations must be usable from the crawl task and safe to share
/// between units.
pub trait ArtifactStore: Send + Sync {
    /// Lists the names of the regular files in a directory
    fn list_files(&self, dir: &Path) -> StoreResult<BTreeSet<String>>;

    /// Captures the directory listing before a download is triggered
    fn snapshot(&self, dir: &Path) -> StoreResult<BTreeSet<String>> {
        self.list_files(dir)
    }

    /// Returns the size in bytes of a file in a directory
    fn file_size(&self, dir: &Path, name: &str) -> StoreResult<u64>;

    /// Creates the directory and its parents if absent (idempotent)
    fn ensure_dir(&self, dir: &Path) -> StoreResult<()>;

    /// Verifies that files can be created in the directory
    fn check_writable(&self, dir: &Path) -> StoreResult<()>;
}
