//! Filesystem-backed artifact store

use crate::store::traits::{ArtifactStore, StoreError, StoreResult};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

/// Name of the temporary file used to probe writability
const WRITE_PROBE_NAME: &str = ".stacks-crawler-write-probe";

/// Artifact store over the local filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct FsArtifactStore;

impl FsArtifactStore {
    pub fn new() -> Self {
        Self
    }
}

impl ArtifactStore for FsArtifactStore {
    fn list_files(&self, dir: &Path) -> StoreResult<BTreeSet<String>> {
        let entries = fs::read_dir(dir).map_err(|e| StoreError::io(dir, e))?;

        let mut names = BTreeSet::new();
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::io(dir, e))?;
            let file_type = entry.file_type().map_err(|e| StoreError::io(dir, e))?;
            if !file_type.is_file() {
                continue;
            }
            // Non-UTF-8 names cannot match an accepted extension anyway
            if let Some(name) = entry.file_name().to_str() {
                names.insert(name.to_string());
            }
        }

        Ok(names)
    }

    fn file_size(&self, dir: &Path, name: &str) -> StoreResult<u64> {
        let path = dir.join(name);
        let metadata = fs::metadata(&path).map_err(|e| StoreError::io(&path, e))?;
        Ok(metadata.len())
    }

    fn ensure_dir(&self, dir: &Path) -> StoreResult<()> {
        if dir.exists() && !dir.is_dir() {
            return Err(StoreError::NotADirectory(dir.to_path_buf()));
        }
        fs::create_dir_all(dir).map_err(|e| StoreError::io(dir, e))
    }

    fn check_writable(&self, dir: &Path) -> StoreResult<()> {
        if !dir.is_dir() {
            return Err(StoreError::NotADirectory(dir.to_path_buf()));
        }

        let probe = dir.join(WRITE_PROBE_NAME);
        fs::write(&probe, b"").map_err(|e| StoreError::io(&probe, e))?;
        fs::remove_file(&probe).map_err(|e| StoreError::io(&probe, e))?;
        Ok(())
    }
}
