use crate::compose::{ComposeBackend, ComposeService};
use crate::exec::ContainerExec;
use crate::RuntimeError;
use stackyard_schema::ContainerName;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecCall {
    pub container: String,
    pub command: String,
}

/// Records every command instead of running it. Failure can be injected
/// with [`MockExec::fail_with`].
#[derive(Default)]
pub struct MockExec {
    calls: Mutex<Vec<ExecCall>>,
    failure: Mutex<Option<String>>,
}

impl MockExec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent exec fail with `output`, or succeed again on `None`.
    pub fn fail_with(&self, output: Option<&str>) {
        if let Ok(mut f) = self.failure.lock() {
            *f = output.map(str::to_owned);
        }
    }

    pub fn calls(&self) -> Vec<ExecCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl ContainerExec for MockExec {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn available(&self) -> bool {
        true
    }

    fn exec(&self, container: &ContainerName, command: &str) -> Result<String, RuntimeError> {
        self.calls
            .lock()
            .map_err(|e| RuntimeError::ExecFailed(format!("mutex poisoned: {e}")))?
            .push(ExecCall {
                container: container.to_string(),
                command: command.to_owned(),
            });
        let failure = self
            .failure
            .lock()
            .map_err(|e| RuntimeError::ExecFailed(format!("mutex poisoned: {e}")))?
            .clone();
        match failure {
            Some(output) => Err(RuntimeError::ExecFailed(output)),
            None => Ok(String::new()),
        }
    }
}

/// Compose backend that records `up`/`down` calls.
///
/// `parse_project` returns the services set with [`MockCompose::set_services`].
/// Without any it reads the two-space indented keys under `services:`,
/// taking `container_name:` values with `${VAR}` references resolved from
/// the supplied environment and `<project>-<service>-1` otherwise.
#[derive(Default)]
pub struct MockCompose {
    ups: Mutex<Vec<PathBuf>>,
    downs: Mutex<Vec<PathBuf>>,
    projects: Mutex<Vec<String>>,
    up_failure: Mutex<Option<String>>,
    services: Mutex<Option<Vec<ComposeService>>>,
}

impl MockCompose {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_up_with(&self, output: Option<&str>) {
        if let Ok(mut f) = self.up_failure.lock() {
            *f = output.map(str::to_owned);
        }
    }

    pub fn set_services(&self, services: Vec<ComposeService>) {
        if let Ok(mut s) = self.services.lock() {
            *s = Some(services);
        }
    }

    pub fn ups(&self) -> Vec<PathBuf> {
        self.ups.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn downs(&self) -> Vec<PathBuf> {
        self.downs.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Project names passed to `up` and `down`, in call order.
    pub fn projects(&self) -> Vec<String> {
        self.projects.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

fn poisoned<E: std::fmt::Display>(e: E) -> RuntimeError {
    RuntimeError::ComposeFailed {
        output: String::new(),
        reason: format!("mutex poisoned: {e}"),
    }
}

impl ComposeBackend for MockCompose {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn up(&self, compose_file: &Path, project: &str) -> Result<String, RuntimeError> {
        self.ups
            .lock()
            .map_err(poisoned)?
            .push(compose_file.to_path_buf());
        self.projects
            .lock()
            .map_err(poisoned)?
            .push(project.to_owned());
        match self.up_failure.lock().map_err(poisoned)?.clone() {
            Some(output) => Err(RuntimeError::ComposeFailed {
                output,
                reason: "exit status: 1".to_owned(),
            }),
            None => Ok(String::new()),
        }
    }

    fn down(&self, compose_file: &Path, project: &str) -> Result<String, RuntimeError> {
        self.downs
            .lock()
            .map_err(poisoned)?
            .push(compose_file.to_path_buf());
        self.projects
            .lock()
            .map_err(poisoned)?
            .push(project.to_owned());
        Ok(String::new())
    }

    fn parse_project(
        &self,
        project: &str,
        compose_yaml: &str,
        env: &BTreeMap<String, String>,
    ) -> Result<Vec<ComposeService>, RuntimeError> {
        if let Some(services) = self.services.lock().map_err(poisoned)?.clone() {
            return Ok(services);
        }

        let mut services: Vec<ComposeService> = Vec::new();
        let mut in_services = false;
        for line in compose_yaml.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let indent = line.len() - line.trim_start().len();
            if indent == 0 {
                in_services = trimmed == "services:";
            } else if !in_services {
                continue;
            } else if indent == 2 {
                if let Some(name) = trimmed.strip_suffix(':') {
                    services.push(ComposeService {
                        name: name.to_owned(),
                        container_name: ContainerName::new(format!("{project}-{name}-1")),
                    });
                }
            } else if let Some(value) = trimmed.strip_prefix("container_name:") {
                if let Some(service) = services.last_mut() {
                    let value = value.trim().trim_matches('"').trim_matches('\'');
                    service.container_name = ContainerName::new(interpolate(value, env));
                }
            }
        }
        services.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(services)
    }
}

fn interpolate(value: &str, env: &BTreeMap<String, String>) -> String {
    let mut out = String::new();
    let mut rest = value;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let Some(end) = rest[start..].find('}') else {
            out.push_str(&rest[start..]);
            return out;
        };
        let var = &rest[start + 2..start + end];
        if let Some(v) = env.get(var) {
            out.push_str(v);
        }
        rest = &rest[start + end + 1..];
    }
    out.push_str(rest);
    out
}
