//! Artifact store module
//!
//! This module defines where downloaded artifacts land and how the crawler
//! observes them:
//! - The `ArtifactStore` trait used by the download monitor
//! - A filesystem implementation used by the binary

mod fs;
mod traits;

pub use fs::FsArtifactStore;
pub use traits::{ArtifactStore, StoreError, StoreResult};
