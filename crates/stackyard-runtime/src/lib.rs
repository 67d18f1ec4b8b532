//! Container-side execution for Stackyard.
//!
//! This crate implements the process boundary: the `ContainerExec` trait with
//! a `docker exec` backend, the `ComposeBackend` trait with a `docker compose`
//! backend, engine-specific provisioning commands (`format_command`), the
//! `ResourceProvisioner` that runs them inside a provider container, mock
//! backends for tests, and prerequisite checking.

pub mod compose;
pub mod exec;
pub mod mock;
pub mod prereq;
pub mod provisioner;
pub mod sql;

pub use compose::{project_name, select_compose, ComposeBackend, ComposeService, DockerCompose};
pub use exec::{select_exec, ContainerExec, DockerExec};
pub use mock::{ExecCall, MockCompose, MockExec};
pub use prereq::{check_docker_prereqs, format_missing, MissingPrereq};
pub use provisioner::ResourceProvisioner;
pub use sql::{format_command, is_database_engine, ContainerExecSpec, DatabaseOp};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("runtime I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("backend '{0}' is not available on this system")]
    BackendUnavailable(String),
    /// Raw output of a command that exited non-zero or could not be spawned.
    #[error("{0}")]
    ExecFailed(String),
    #[error("compose failed: {reason}")]
    ComposeFailed { output: String, reason: String },
    #[error("invalid compose project: {0}")]
    InvalidProject(String),
}

impl RuntimeError {
    /// Text worth showing to a user: captured command output when there is
    /// any, the error itself otherwise.
    pub fn diagnostic(&self) -> String {
        match self {
            RuntimeError::ComposeFailed { output, .. } if !output.trim().is_empty() => {
                output.clone()
            }
            other => other.to_string(),
        }
    }
}
