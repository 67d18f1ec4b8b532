use crate::binding::AuthParam;
use crate::params::ResolvedParams;
use crate::types::{AppKey, ContainerName, RecordId, ServiceName};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum InstallStatus {
    #[default]
    Installing,
    Running,
    Error,
}

impl fmt::Display for InstallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstallStatus::Installing => write!(f, "installing"),
            InstallStatus::Running => write!(f, "running"),
            InstallStatus::Error => write!(f, "error"),
        }
    }
}

/// One running instance of an app version.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppInstall {
    #[serde(default)]
    pub id: RecordId,
    pub name: String,
    pub app_id: RecordId,
    pub app_key: AppKey,
    pub app_detail_id: RecordId,
    pub version: String,
    pub service_name: ServiceName,
    #[serde(default)]
    pub container_name: ContainerName,
    #[serde(default)]
    pub params: ResolvedParams,
    /// Root credentials kept for installs that host resources for others.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthParam>,
    /// Compose document the stack was brought up from.
    #[serde(default)]
    pub compose: String,
    /// JSON-serialized environment map written to the install's `.env`.
    #[serde(default)]
    pub env: String,
    #[serde(default)]
    pub status: InstallStatus,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

/// A provisioned backing resource (currently always a database) created to
/// serve one consumer install.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Database {
    #[serde(default)]
    pub id: RecordId,
    /// Engine key of the provider app, e.g. `mysql`.
    pub engine: String,
    pub name: String,
    pub username: String,
    pub password: String,
    /// Install hosting the physical database server.
    pub app_install_id: RecordId,
}

/// Link between a consumer install and a [`Database`] it depends on.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppInstallResource {
    #[serde(default)]
    pub id: RecordId,
    pub consumer_install_id: RecordId,
    pub resource_id: RecordId,
    pub provider_install_id: RecordId,
    pub engine: String,
}
