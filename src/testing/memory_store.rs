//! In-memory artifact store

use crate::store::{ArtifactStore, StoreError, StoreResult};
use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct StoreState {
    dirs: BTreeMap<PathBuf, BTreeMap<String, u64>>,
    unwritable: BTreeSet<PathBuf>,
}

/// Artifact store keeping directory listings in memory
///
/// Clones share the same contents, so a simulated browser can "download" into
/// the store the crawler is watching.
#[derive(Debug, Clone, Default)]
pub struct MemoryArtifactStore {
    inner: Arc<Mutex<StoreState>>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, StoreState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds a file, creating its directory if needed
    pub fn add_file(&self, dir: &Path, name: &str, size_bytes: u64) {
        self.state()
            .dirs
            .entry(dir.to_path_buf())
            .or_default()
            .insert(name.to_string(), size_bytes);
    }

    pub fn remove_file(&self, dir: &Path, name: &str) {
        if let Some(files) = self.state().dirs.get_mut(dir) {
            files.remove(name);
        }
    }

    /// Names of the files in a directory, in lexical order
    pub fn files_in(&self, dir: &Path) -> Vec<String> {
        self.state()
            .dirs
            .get(dir)
            .map(|files| files.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn dir_exists(&self, dir: &Path) -> bool {
        self.state().dirs.contains_key(dir)
    }

    /// Makes `check_writable` fail for the directory
    pub fn make_unwritable(&self, dir: &Path) {
        self.state().unwritable.insert(dir.to_path_buf());
    }
}

impl ArtifactStore for MemoryArtifactStore {
    fn list_files(&self, dir: &Path) -> StoreResult<BTreeSet<String>> {
        self.state()
            .dirs
            .get(dir)
            .map(|files| files.keys().cloned().collect())
            .ok_or_else(|| {
                StoreError::io(dir, io::Error::new(io::ErrorKind::NotFound, "no such directory"))
            })
    }

    fn file_size(&self, dir: &Path, name: &str) -> StoreResult<u64> {
        self.state()
            .dirs
            .get(dir)
            .and_then(|files| files.get(name).copied())
            .ok_or_else(|| {
                StoreError::io(
                    &dir.join(name),
                    io::Error::new(io::ErrorKind::NotFound, "no such file"),
                )
            })
    }

    fn ensure_dir(&self, dir: &Path) -> StoreResult<()> {
        self.state().dirs.entry(dir.to_path_buf()).or_default();
        Ok(())
    }

    fn check_writable(&self, dir: &Path) -> StoreResult<()> {
        let state = self.state();
        if !state.dirs.contains_key(dir) {
            return Err(StoreError::NotADirectory(dir.to_path_buf()));
        }
        if state.unwritable.contains(dir) {
            return Err(StoreError::io(
                dir,
                io::Error::new(io::ErrorKind::PermissionDenied, "read-only directory"),
            ));
        }
        Ok(())
    }
}
