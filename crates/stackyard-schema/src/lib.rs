//! Record types, fetched catalog definitions, and install parameters for Stackyard.
//!
//! This crate defines the schema layer: identifier newtypes (`AppKey`,
//! `ServiceName`, `RecordId`), persisted catalog records (`App`, `AppDetail`),
//! install-side records (`AppInstall`, `Database`, `AppInstallResource`), the
//! fetched catalog format (`CatalogList`), declared install parameters
//! (`ParamSchema` → `ResolvedParams`), and the resource binding descriptors
//! decoded from those parameters.

pub mod binding;
pub mod catalog;
pub mod install;
pub mod params;
pub mod types;

pub use binding::{AuthParam, DatabaseBinding};
pub use catalog::{
    parse_catalog_file, parse_catalog_str, App, AppDefine, AppDetail, AppType, CatalogList,
    CatalogStatus,
};
pub use install::{AppInstall, AppInstallResource, Database, InstallStatus};
pub use params::{ParamField, ParamKind, ParamSchema, ParamValue, ResolvedParams};
pub use types::{AppKey, ContainerName, RecordId, ServiceName};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("failed to read schema file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse schema document: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("parameter '{0}' is not declared by the app version")]
    UnknownParam(String),
    #[error("required parameter '{0}' is missing")]
    MissingParam(String),
    #[error("parameter '{key}' must be a {expected}")]
    ParamTypeMismatch { key: String, expected: ParamKind },
    #[error("incomplete database binding, missing: {}", .0.join(", "))]
    IncompleteBinding(Vec<String>),
    #[error("catalog entry '{0}' has an empty key")]
    EmptyKey(String),
}
