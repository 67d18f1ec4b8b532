use crate::RuntimeError;
use stackyard_schema::ContainerName;
use std::process::Command;

/// Runs shell commands inside a named, already running container.
pub trait ContainerExec: Send + Sync {
    fn name(&self) -> &str;

    fn available(&self) -> bool;

    /// Run `command` through `sh -c` inside `container` and return its stdout.
    /// A non-zero exit or a spawn failure becomes
    /// [`RuntimeError::ExecFailed`] carrying the raw output.
    fn exec(&self, container: &ContainerName, command: &str) -> Result<String, RuntimeError>;
}

pub struct DockerExec {
    docker_bin: String,
}

impl Default for DockerExec {
    fn default() -> Self {
        Self {
            docker_bin: "docker".to_owned(),
        }
    }
}

impl DockerExec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_binary(docker_bin: impl Into<String>) -> Self {
        Self {
            docker_bin: docker_bin.into(),
        }
    }
}

impl ContainerExec for DockerExec {
    fn name(&self) -> &'static str {
        "docker"
    }

    fn available(&self) -> bool {
        Command::new(&self.docker_bin)
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn exec(&self, container: &ContainerName, command: &str) -> Result<String, RuntimeError> {
        let output = Command::new(&self.docker_bin)
            .args(["exec", "-i", container.as_str(), "sh", "-c", command])
            .output()
            .map_err(|e| {
                RuntimeError::ExecFailed(format!("failed to spawn {}: {e}", self.docker_bin))
            })?;
        output_to_result(&output)
    }
}

pub(crate) fn output_to_result(output: &std::process::Output) -> Result<String, RuntimeError> {
    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    if output.status.success() {
        return Ok(stdout);
    }
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
    let raw = if !stderr.trim().is_empty() {
        stderr
    } else if !stdout.trim().is_empty() {
        stdout
    } else {
        output.status.to_string()
    };
    Err(RuntimeError::ExecFailed(raw.trim_end().to_owned()))
}

pub fn select_exec(name: &str, docker_bin: &str) -> Result<Box<dyn ContainerExec>, RuntimeError> {
    match name {
        "docker" => Ok(Box::new(DockerExec::with_binary(docker_bin))),
        "mock" => Ok(Box::new(crate::mock::MockExec::new())),
        other => Err(RuntimeError::BackendUnavailable(other.to_owned())),
    }
}
