use crate::exec::output_to_result;
use crate::RuntimeError;
use serde_json::Value;
use stackyard_schema::ContainerName;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};
use tracing::debug;

/// A service of a compose project and the container it runs as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposeService {
    pub name: String,
    pub container_name: ContainerName,
}

pub trait ComposeBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Bring the stack described by `compose_file` up as `project`, detached.
    /// The project directory is the file's parent, so its `.env` applies.
    fn up(&self, compose_file: &Path, project: &str) -> Result<String, RuntimeError>;

    fn down(&self, compose_file: &Path, project: &str) -> Result<String, RuntimeError>;

    /// Resolve a compose document as `project` with `env` interpolated and
    /// list its services.
    fn parse_project(
        &self,
        project: &str,
        compose_yaml: &str,
        env: &BTreeMap<String, String>,
    ) -> Result<Vec<ComposeService>, RuntimeError>;
}

/// Compose project name for an install, normalized the way compose
/// normalizes directory names: lowercase, only `[a-z0-9_-]`, starting with a
/// letter or digit.
pub fn project_name(install_name: &str) -> String {
    install_name
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .skip_while(|c| !c.is_ascii_alphanumeric())
        .collect()
}

pub struct DockerCompose {
    docker_bin: String,
}

impl Default for DockerCompose {
    fn default() -> Self {
        Self {
            docker_bin: "docker".to_owned(),
        }
    }
}

impl DockerCompose {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_binary(docker_bin: impl Into<String>) -> Self {
        Self {
            docker_bin: docker_bin.into(),
        }
    }

    fn run(&self, compose_file: &Path, project: &str, args: &[&str]) -> Result<String, RuntimeError> {
        let project_dir = compose_file.parent().unwrap_or(Path::new("."));
        debug!(
            "docker compose -p {project} -f {} {}",
            compose_file.display(),
            args.join(" ")
        );
        let output = Command::new(&self.docker_bin)
            .args(["compose", "-p", project])
            .arg("-f")
            .arg(compose_file)
            .args(args)
            .current_dir(project_dir)
            .output()
            .map_err(|e| RuntimeError::ComposeFailed {
                output: String::new(),
                reason: format!("failed to spawn {}: {e}", self.docker_bin),
            })?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        if output.status.success() {
            Ok(combined)
        } else {
            Err(RuntimeError::ComposeFailed {
                output: combined.trim_end().to_owned(),
                reason: output.status.to_string(),
            })
        }
    }
}

impl ComposeBackend for DockerCompose {
    fn name(&self) -> &'static str {
        "docker"
    }

    fn up(&self, compose_file: &Path, project: &str) -> Result<String, RuntimeError> {
        self.run(compose_file, project, &["up", "-d"])
    }

    fn down(&self, compose_file: &Path, project: &str) -> Result<String, RuntimeError> {
        self.run(compose_file, project, &["down"])
    }

    fn parse_project(
        &self,
        project: &str,
        compose_yaml: &str,
        env: &BTreeMap<String, String>,
    ) -> Result<Vec<ComposeService>, RuntimeError> {
        debug!("docker compose -p {project} -f - config");
        let mut child = Command::new(&self.docker_bin)
            .args(["compose", "-p", project, "-f", "-", "config", "--format", "json"])
            .envs(env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(compose_yaml.as_bytes())?;
        }
        let output = child.wait_with_output()?;
        let json = output_to_result(&output)
            .map_err(|e| RuntimeError::InvalidProject(e.to_string()))?;
        let config: Value = serde_json::from_str(&json)
            .map_err(|e| RuntimeError::InvalidProject(format!("unreadable config output: {e}")))?;
        services_from_config(&config)
    }
}

/// Extract services from `docker compose config --format json` output.
/// Services without an explicit `container_name` get compose's default
/// `<project>-<service>-1`.
pub fn services_from_config(config: &Value) -> Result<Vec<ComposeService>, RuntimeError> {
    let project = config.get("name").and_then(Value::as_str).unwrap_or("");
    let services = config
        .get("services")
        .and_then(Value::as_object)
        .ok_or_else(|| RuntimeError::InvalidProject("no services defined".to_owned()))?;

    Ok(services
        .iter()
        .map(|(name, service)| {
            let container_name = service
                .get("container_name")
                .and_then(Value::as_str)
                .map_or_else(|| format!("{project}-{name}-1"), str::to_owned);
            ComposeService {
                name: name.clone(),
                container_name: ContainerName::new(container_name),
            }
        })
        .collect())
}

pub fn select_compose(
    name: &str,
    docker_bin: &str,
) -> Result<Box<dyn ComposeBackend>, RuntimeError> {
    match name {
        "docker" => Ok(Box::new(DockerCompose::with_binary(docker_bin))),
        "mock" => Ok(Box::new(crate::mock::MockCompose::new())),
        other => Err(RuntimeError::BackendUnavailable(other.to_owned())),
    }
}
