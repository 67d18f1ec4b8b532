use crate::lifecycle::validate_transition;
use crate::CoreError;
use stackyard_runtime::{project_name, ComposeBackend, RuntimeError};
use stackyard_schema::{
    AppInstall, InstallStatus, ParamSchema, ParamValue, ResolvedParams, SchemaError,
};
use stackyard_store::Repository;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info, warn};

pub const COMPOSE_FILE: &str = "docker-compose.yml";
pub const ENV_FILE: &str = ".env";

#[derive(Debug, Error)]
pub enum MaterializeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("no template for {key} {version} at {}", path.display())]
    TemplateNotFound {
        key: String,
        version: String,
        path: PathBuf,
    },
    #[error("already installed: {0}")]
    AlreadyInstalled(String),
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),
}

/// Writes an install's environment entries to disk.
pub trait EnvFileWriter: Send + Sync {
    fn write(&self, params: &ResolvedParams, path: &Path) -> Result<(), MaterializeError>;
}

/// `.env` writer in the dotenv format compose reads.
///
/// Numbers and booleans are written bare. Strings are always double-quoted
/// with `\`, `"`, `!`, `$`, `` ` `` and line breaks escaped, so "0123" stays
/// "0123". Lines are sorted.
#[derive(Debug, Default, Clone, Copy)]
pub struct DotEnvWriter;

impl DotEnvWriter {
    pub fn render(params: &ResolvedParams) -> String {
        let mut lines: Vec<String> = params
            .iter()
            .map(|(k, v)| match v {
                ParamValue::String(s) => format!("{k}=\"{}\"", escape_value(s)),
                ParamValue::Number(_) | ParamValue::Bool(_) => format!("{k}={}", v.render()),
            })
            .collect();
        lines.sort();
        let mut out = lines.join("\n");
        out.push('\n');
        out
    }
}

fn escape_value(v: &str) -> String {
    let mut out = String::with_capacity(v.len());
    for c in v.chars() {
        match c {
            '\\' | '"' | '!' | '$' | '`' => {
                out.push('\\');
                out.push(c);
            }
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
    out
}

impl EnvFileWriter for DotEnvWriter {
    fn write(&self, params: &ResolvedParams, path: &Path) -> Result<(), MaterializeError> {
        let dir = path.parent().unwrap_or(Path::new("."));
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(Self::render(params).as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| MaterializeError::Io(e.error))?;
        Ok(())
    }
}

/// Recursively copy `src` into `dst`, creating `dst` as needed.
pub fn copy_dir_all(src: &Path, dst: &Path) -> Result<(), std::io::Error> {
    fs::create_dir_all(dst)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let target = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_all(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Turns an app version template into an install directory and records how
/// bringing its stack up went.
///
/// Templates live in `<resource_dir>/apps/<key>/<version>`, installs in
/// `<app_dir>/<key>/<install name>`.
pub struct InstallMaterializer {
    resource_dir: PathBuf,
    app_dir: PathBuf,
    env_writer: Box<dyn EnvFileWriter>,
    compose: Arc<dyn ComposeBackend>,
    installs: Arc<dyn Repository<AppInstall>>,
}

impl InstallMaterializer {
    pub fn new(
        resource_dir: impl Into<PathBuf>,
        app_dir: impl Into<PathBuf>,
        compose: Arc<dyn ComposeBackend>,
        installs: Arc<dyn Repository<AppInstall>>,
    ) -> Self {
        Self {
            resource_dir: resource_dir.into(),
            app_dir: app_dir.into(),
            env_writer: Box::new(DotEnvWriter),
            compose,
            installs,
        }
    }

    #[must_use]
    pub fn with_env_writer(mut self, writer: Box<dyn EnvFileWriter>) -> Self {
        self.env_writer = writer;
        self
    }

    pub fn template_dir(&self, key: &str, version: &str) -> PathBuf {
        self.resource_dir.join("apps").join(key).join(version)
    }

    pub fn install_dir(&self, key: &str, install_name: &str) -> PathBuf {
        self.app_dir.join(key).join(install_name)
    }

    fn existing_template(&self, key: &str, version: &str) -> Result<PathBuf, MaterializeError> {
        let path = self.template_dir(key, version);
        if !path.is_dir() {
            return Err(MaterializeError::TemplateNotFound {
                key: key.to_owned(),
                version: version.to_owned(),
                path,
            });
        }
        Ok(path)
    }

    /// Validate raw install input against the version's declared parameters.
    pub fn resolve_params(
        &self,
        key: &str,
        version: &str,
        raw: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<ResolvedParams, MaterializeError> {
        let template = self.existing_template(key, version)?;
        Ok(ParamSchema::load(&template)?.resolve(raw)?)
    }

    /// The version's compose document, before any install copies it.
    pub fn template_compose(&self, key: &str, version: &str) -> Result<String, MaterializeError> {
        let template = self.existing_template(key, version)?;
        Ok(fs::read_to_string(template.join(COMPOSE_FILE))?)
    }

    /// Copy the version template into a new install directory and write its
    /// `.env`. Returns the install directory.
    pub fn materialize(
        &self,
        key: &str,
        version: &str,
        install_name: &str,
        params: &ResolvedParams,
    ) -> Result<PathBuf, MaterializeError> {
        let template = self.existing_template(key, version)?;
        let install_dir = self.install_dir(key, install_name);
        if install_dir.exists() {
            return Err(MaterializeError::AlreadyInstalled(
                install_dir.display().to_string(),
            ));
        }
        let staging = self.app_dir.join(key).join(version);
        if staging != install_dir && staging.exists() {
            return Err(MaterializeError::AlreadyInstalled(
                staging.display().to_string(),
            ));
        }

        debug!("copying {} to {}", template.display(), staging.display());
        if let Err(e) = copy_dir_all(&template, &staging) {
            remove_best_effort(&staging);
            return Err(e.into());
        }
        if let Err(e) = fs::rename(&staging, &install_dir) {
            remove_best_effort(&staging);
            return Err(e.into());
        }

        let env_path = install_dir.join(ENV_FILE);
        if let Err(e) = self.env_writer.write(params, &env_path) {
            remove_best_effort(&install_dir);
            return Err(e);
        }
        info!("materialized {key} {version} into {}", install_dir.display());
        Ok(install_dir)
    }

    /// Run compose up for `install` and persist the outcome.
    ///
    /// A compose failure is not an error here: it ends up as status `Error`
    /// with the captured output as the install's message.
    pub fn bring_up(
        &self,
        compose_file: &Path,
        install: &mut AppInstall,
    ) -> Result<InstallStatus, CoreError> {
        validate_transition(install.status, InstallStatus::Running)?;

        match self.compose.up(compose_file, &project_name(&install.name)) {
            Ok(_) => {
                install.status = InstallStatus::Running;
                install.message.clear();
                info!("install '{}' is running", install.name);
            }
            Err(e) => {
                install.status = InstallStatus::Error;
                install.message = e.diagnostic();
                warn!("install '{}' failed to start: {e}", install.name);
            }
        }
        install.updated_at = chrono::Utc::now().to_rfc3339();
        self.record_best_effort(install);
        Ok(install.status)
    }

    /// Bring the install's stack down and remove its directory.
    pub fn teardown(&self, install: &AppInstall) -> Result<(), CoreError> {
        let dir = self.install_dir(install.app_key.as_str(), &install.name);
        if !dir.exists() {
            debug!("install directory {} already gone", dir.display());
            return Ok(());
        }
        let compose_file = dir.join(COMPOSE_FILE);
        if compose_file.exists() {
            self.compose
                .down(&compose_file, &project_name(&install.name))?;
        }
        fs::remove_dir_all(&dir)?;
        Ok(())
    }

    /// Persist `install`, logging instead of failing when the write fails.
    pub fn record_best_effort(&self, install: &AppInstall) {
        if let Err(e) = self.installs.save(install) {
            warn!("failed to record status of install '{}': {e}", install.name);
        }
    }

    /// Mark `install` failed, record it, and return the error to propagate.
    ///
    /// Non-empty command `output` becomes both the stored message and the
    /// returned error; otherwise `err` is stored and returned.
    pub fn record_failure(&self, install: &mut AppInstall, err: CoreError, output: &str) -> CoreError {
        install.status = InstallStatus::Error;
        install.updated_at = chrono::Utc::now().to_rfc3339();
        let returned = if output.trim().is_empty() {
            install.message = err.to_string();
            err
        } else {
            install.message = output.to_owned();
            CoreError::Runtime(RuntimeError::ExecFailed(output.to_owned()))
        };
        self.record_best_effort(install);
        returned
    }
}

fn remove_best_effort(path: &Path) {
    if path.exists() {
        if let Err(e) = fs::remove_dir_all(path) {
            warn!("failed to clean up {}: {e}", path.display());
        }
    }
}
