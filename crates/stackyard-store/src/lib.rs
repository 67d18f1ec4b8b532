//! Record persistence for Stackyard.
//!
//! This crate provides the storage layer: the per-entity `Repository` contract
//! with composable filters (`AppFilter`, `InstallFilter`, ...), a
//! `JsonRepository` that keeps one checksummed JSON file per record with
//! atomic writes, a `MemoryRepository` for tests, the `Repositories` bundle
//! injected into the core components, and `StoreLayout` for directory
//! structure management.

pub mod json;
pub mod layout;
pub mod memory;
pub mod record;
pub mod repository;

pub use json::JsonRepository;
pub use layout::{StoreLayout, STORE_FORMAT_VERSION};
pub use memory::MemoryRepository;
pub use record::{
    AppDetailFilter, AppFilter, DatabaseFilter, InstallFilter, Record, ResourceFilter,
};
pub use repository::{Repositories, Repository};

use std::path::Path;
use thiserror::Error;

/// Fsync a directory to ensure that a preceding `rename()` is durable.
///
/// POSIX does not guarantee a rename is durable until the parent directory
/// itself has been synced.
pub(crate) fn fsync_dir(dir: &Path) -> Result<(), std::io::Error> {
    let f = std::fs::File::open(dir)?;
    f.sync_all()
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("integrity check failed for record '{record}': expected {expected}, got {actual}")]
    IntegrityFailure {
        record: String,
        expected: String,
        actual: String,
    },
    #[error("lock acquisition failed: {0}")]
    LockFailed(String),
    #[error("store format version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("cannot save a {0} record that has no id")]
    UnsetId(&'static str),
    #[error("refusing to delete {0} records without a filter")]
    UnscopedDelete(&'static str),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}
