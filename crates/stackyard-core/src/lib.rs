//! Core orchestration for Stackyard app installs.
//!
//! This crate ties together the schema, store, and runtime crates into the
//! `Engine`: the central API for syncing the app catalog, installing and
//! uninstalling app versions, and inspecting installs. Underneath it are the
//! `InstallGate` (install limits and required apps), the `LinkManager`
//! (database resources shared between installs), the `CatalogReconciler`,
//! the `InstallMaterializer`, file locks, and install status transitions.

pub mod catalog;
pub mod concurrency;
pub mod config;
pub mod engine;
pub mod gate;
pub mod lifecycle;
pub mod link;
pub mod materialize;

pub use catalog::{
    reconcile_apps, reconcile_versions, CatalogReconciler, CatalogSource, DirectoryCatalogSource,
    SyncReport,
};
pub use concurrency::{KeyedLock, StoreLock};
pub use config::{EngineConfig, CONFIG_FILE};
pub use engine::{AppListing, Engine, InstallReport, InstallRequest, LinkView};
pub use gate::{GateError, InstallGate};
pub use lifecycle::validate_transition;
pub use link::{LinkError, LinkManager};
pub use materialize::{
    copy_dir_all, DotEnvWriter, EnvFileWriter, InstallMaterializer, MaterializeError,
};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("schema error: {0}")]
    Schema(#[from] stackyard_schema::SchemaError),
    #[error("store error: {0}")]
    Store(#[from] stackyard_store::StoreError),
    #[error("runtime error: {0}")]
    Runtime(#[from] stackyard_runtime::RuntimeError),
    #[error(transparent)]
    Gate(#[from] GateError),
    #[error(transparent)]
    Link(#[from] LinkError),
    #[error(transparent)]
    Materialize(#[from] MaterializeError),
    #[error("app not found: {0}")]
    AppNotFound(String),
    #[error("app '{key}' has no version '{version}'")]
    VersionNotFound { key: String, version: String },
    #[error("install not found: {0}")]
    InstallNotFound(String),
    #[error("port {0} is already in use")]
    PortInUse(u16),
    #[error("a catalog sync is already running")]
    SyncInProgress,
    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
    #[error("configuration error: {0}")]
    Config(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
