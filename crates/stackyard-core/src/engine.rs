use crate::catalog::{CatalogReconciler, CatalogSource, DirectoryCatalogSource, SyncReport};
use crate::concurrency::KeyedLock;
use crate::config::EngineConfig;
use crate::gate::InstallGate;
use crate::link::LinkManager;
use crate::materialize::{InstallMaterializer, MaterializeError, COMPOSE_FILE};
use crate::CoreError;
use serde::Serialize;
use stackyard_runtime::{
    project_name, select_compose, select_exec, ComposeBackend, ComposeService, ContainerExec,
    ResourceProvisioner,
};
use stackyard_schema::{
    App, AppDetail, AppInstall, AppInstallResource, ContainerName, Database, InstallStatus,
    ParamKind, RecordId, ResolvedParams, SchemaError,
};
use stackyard_store::{
    AppDetailFilter, AppFilter, DatabaseFilter, InstallFilter, Repositories, ResourceFilter,
    StoreLayout,
};
use std::collections::BTreeMap;
use std::net::TcpListener;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Install parameters holding host ports that must be free before install.
pub const PORT_PARAMS: [&str; 2] = ["PANEL_APP_PORT_HTTP", "PANEL_APP_PORT_HTTPS"];

/// What the user asked to install.
#[derive(Debug, Clone, Default)]
pub struct InstallRequest {
    pub app_key: String,
    pub version: String,
    pub name: String,
    /// Raw parameter values, validated against the version's `params.json`.
    pub params: serde_json::Map<String, serde_json::Value>,
}

/// A catalog app with all of its versions.
#[derive(Debug, Clone, Serialize)]
pub struct AppListing {
    pub app: App,
    pub versions: Vec<AppDetail>,
}

/// One link of an install, with the database it points at when that still exists.
#[derive(Debug, Clone, Serialize)]
pub struct LinkView {
    pub link: AppInstallResource,
    pub database: Option<Database>,
    pub provider: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InstallReport {
    pub install: AppInstall,
    /// Resources this install consumes.
    pub links: Vec<LinkView>,
    /// Databases other installs keep in this install.
    pub hosted: Vec<Database>,
}

/// Central API for the app catalog and app installs.
///
/// Coordinates the catalog reconciler, install gate, materializer and link
/// manager over one set of repositories and container backends.
pub struct Engine {
    layout: StoreLayout,
    config: EngineConfig,
    repos: Repositories,
    compose: Arc<dyn ComposeBackend>,
    gate: InstallGate,
    links: LinkManager,
    materializer: InstallMaterializer,
    reconciler: CatalogReconciler,
    locks: KeyedLock,
}

impl Engine {
    /// Open the file-backed store at `store_root` with the configured backends.
    pub fn open(store_root: impl Into<PathBuf>, config: EngineConfig) -> Result<Self, CoreError> {
        let layout = StoreLayout::new(store_root);
        layout.initialize()?;
        let repos = Repositories::json(&layout);
        let exec: Arc<dyn ContainerExec> =
            Arc::from(select_exec(&config.backend, &config.docker_bin)?);
        let compose: Arc<dyn ComposeBackend> =
            Arc::from(select_compose(&config.backend, &config.docker_bin)?);
        Ok(Self::with_parts(layout, config, repos, exec, compose))
    }

    pub fn with_parts(
        layout: StoreLayout,
        config: EngineConfig,
        repos: Repositories,
        exec: Arc<dyn ContainerExec>,
        compose: Arc<dyn ComposeBackend>,
    ) -> Self {
        let gate = InstallGate::new(
            repos.apps.clone(),
            repos.details.clone(),
            repos.installs.clone(),
        );
        let links = LinkManager::new(
            repos.installs.clone(),
            repos.databases.clone(),
            repos.resources.clone(),
            ResourceProvisioner::new(exec),
        );
        let materializer = InstallMaterializer::new(
            &config.resource_dir,
            &config.app_dir,
            compose.clone(),
            repos.installs.clone(),
        );
        let reconciler = CatalogReconciler::new(layout.clone(), repos.clone());
        let locks = KeyedLock::new(layout.clone());
        Self {
            layout,
            config,
            repos,
            compose,
            gate,
            links,
            materializer,
            reconciler,
            locks,
        }
    }

    pub fn layout(&self) -> &StoreLayout {
        &self.layout
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Sync the catalog from `<resource_dir>/apps/list.json`.
    pub fn sync_catalog(&self) -> Result<SyncReport, CoreError> {
        self.sync_from(&DirectoryCatalogSource::new(&self.config.resource_dir))
    }

    pub fn sync_from(&self, source: &dyn CatalogSource) -> Result<SyncReport, CoreError> {
        self.reconciler.sync(source)
    }

    /// Install an app version.
    ///
    /// Returns the install record. A stack that fails to come up is not an
    /// error: the install is returned with status `Error` and the compose
    /// output as its message. A failed link marks the install `Error` and
    /// returns the link error.
    pub fn install(&self, request: &InstallRequest) -> Result<AppInstall, CoreError> {
        info!(
            "installing {} {} as '{}'",
            request.app_key, request.version, request.name
        );
        validate_install_name(&request.name)?;

        let app = self
            .repos
            .apps
            .get_first(&[AppFilter::Key(request.app_key.as_str().into())])?
            .ok_or_else(|| CoreError::AppNotFound(request.app_key.clone()))?;
        let detail = self
            .repos
            .details
            .get_first(&[
                AppDetailFilter::AppId(app.id),
                AppDetailFilter::Version(request.version.clone()),
            ])?
            .ok_or_else(|| CoreError::VersionNotFound {
                key: request.app_key.clone(),
                version: request.version.clone(),
            })?;

        let (mut install, params, compose_file) = {
            let _lock = self.locks.lock(&app.key)?;
            self.prepare_install(&app, &detail, request)?
        };

        let status = self.materializer.bring_up(&compose_file, &mut install)?;
        if status != InstallStatus::Running {
            return Ok(install);
        }

        if let Err(e) = self.links.create_link(&app, &mut install, &params) {
            return Err(self.materializer.record_failure(&mut install, e.into(), ""));
        }
        if install.auth.is_some() {
            self.repos.installs.save(&install)?;
        }
        Ok(install)
    }

    /// Everything that has to happen under the app's install lock: checks,
    /// files on disk and the install row.
    fn prepare_install(
        &self,
        app: &App,
        detail: &AppDetail,
        request: &InstallRequest,
    ) -> Result<(AppInstall, ResolvedParams, PathBuf), CoreError> {
        let key = app.key.as_str();
        if self
            .repos
            .installs
            .get_first(&[InstallFilter::Name(request.name.clone())])?
            .is_some()
        {
            return Err(MaterializeError::AlreadyInstalled(request.name.clone()).into());
        }

        self.gate.check_install_allowed(app)?;
        let params = self
            .materializer
            .resolve_params(key, &detail.version, &request.params)?;
        check_ports(&params)?;

        let compose = self.materializer.template_compose(key, &detail.version)?;
        let env = params.to_env_map();
        let services = self
            .compose
            .parse_project(&project_name(&request.name), &compose, &env)?;
        let container_name = main_container(&services, key);

        let install_dir = self
            .materializer
            .materialize(key, &detail.version, &request.name, &params)?;

        let now = chrono::Utc::now().to_rfc3339();
        let mut install = AppInstall {
            id: RecordId::UNSET,
            name: request.name.clone(),
            app_id: app.id,
            app_key: app.key.clone(),
            app_detail_id: detail.id,
            version: detail.version.clone(),
            service_name: request.name.as_str().into(),
            container_name,
            params: params.clone(),
            auth: None,
            compose,
            env: serde_json::to_string(&env)?,
            status: InstallStatus::Installing,
            message: String::new(),
            created_at: now.clone(),
            updated_at: now,
        };
        if let Err(e) = self.repos.installs.create(&mut install) {
            if let Err(cleanup) = std::fs::remove_dir_all(&install_dir) {
                warn!("failed to remove {}: {cleanup}", install_dir.display());
            }
            return Err(e.into());
        }
        debug!("created install record {} for '{}'", install.id, install.name);
        Ok((install, params, install_dir.join(COMPOSE_FILE)))
    }

    /// Remove an install: drop the databases it consumes, bring its stack
    /// down, delete its directory and finally its record.
    ///
    /// A failed teardown leaves the record in place, marked `Error`, so the
    /// uninstall can be retried.
    pub fn uninstall(&self, name: &str) -> Result<(), CoreError> {
        info!("uninstalling '{name}'");
        let mut install = self.find_install(name)?;
        let _lock = self.locks.lock(&install.app_key)?;

        self.links.delete_link(&install)?;
        if let Err(e) = self.materializer.teardown(&install) {
            let output = match &e {
                CoreError::Runtime(r) => r.diagnostic(),
                _ => String::new(),
            };
            return Err(self.materializer.record_failure(&mut install, e, &output));
        }
        self.repos
            .installs
            .delete_by(&[InstallFilter::Id(install.id)])?;
        info!("uninstalled '{name}'");
        Ok(())
    }

    pub fn list_installs(&self) -> Result<Vec<AppInstall>, CoreError> {
        Ok(self.repos.installs.list_readable()?)
    }

    pub fn list_apps(&self) -> Result<Vec<AppListing>, CoreError> {
        let mut apps = self.repos.apps.list_readable()?;
        apps.sort_by(|a, b| a.key.cmp(&b.key));
        let details = self.repos.details.list_readable()?;
        Ok(apps
            .into_iter()
            .map(|app| {
                let mut versions: Vec<AppDetail> = details
                    .iter()
                    .filter(|d| d.app_id == app.id)
                    .cloned()
                    .collect();
                versions.sort_by(|a, b| a.version.cmp(&b.version));
                AppListing { app, versions }
            })
            .collect())
    }

    pub fn inspect(&self, name: &str) -> Result<InstallReport, CoreError> {
        let install = self.find_install(name)?;
        let links = self
            .repos
            .resources
            .get_by(&[ResourceFilter::ConsumerInstallId(install.id)])?
            .into_iter()
            .map(|link| -> Result<LinkView, CoreError> {
                let database = self
                    .repos
                    .databases
                    .get_first(&[DatabaseFilter::Id(link.resource_id)])?;
                let provider = self
                    .repos
                    .installs
                    .get_first(&[InstallFilter::Id(link.provider_install_id)])?
                    .map(|p| p.name);
                Ok(LinkView {
                    link,
                    database,
                    provider,
                })
            })
            .collect::<Result<Vec<_>, CoreError>>()?;
        let hosted = self
            .repos
            .databases
            .get_by(&[DatabaseFilter::AppInstallId(install.id)])?;
        Ok(InstallReport {
            install,
            links,
            hosted,
        })
    }

    /// Container names of every service in the install's compose project,
    /// resolved with the environment the install was created with.
    pub fn container_names(&self, install: &AppInstall) -> Result<Vec<ContainerName>, CoreError> {
        let env: BTreeMap<String, String> = if install.env.is_empty() {
            BTreeMap::new()
        } else {
            serde_json::from_str(&install.env)?
        };
        Ok(self
            .compose
            .parse_project(&project_name(&install.name), &install.compose, &env)?
            .into_iter()
            .map(|s| s.container_name)
            .collect())
    }

    fn find_install(&self, name: &str) -> Result<AppInstall, CoreError> {
        self.repos
            .installs
            .get_first(&[InstallFilter::Name(name.to_owned())])?
            .ok_or_else(|| CoreError::InstallNotFound(name.to_owned()))
    }
}

/// Install names become directory names and compose service names.
fn validate_install_name(name: &str) -> Result<(), CoreError> {
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(CoreError::Config(format!(
            "invalid install name '{name}': use letters, digits, '-', '_' and '.'"
        )))
    }
}

/// Container of the service named after the app, else of the first service.
fn main_container(services: &[ComposeService], app_key: &str) -> ContainerName {
    services
        .iter()
        .find(|s| s.name == app_key)
        .or_else(|| services.first())
        .map(|s| s.container_name.clone())
        .unwrap_or_default()
}

/// Fail when a declared host port is already bound on this machine.
fn check_ports(params: &ResolvedParams) -> Result<(), CoreError> {
    for key in PORT_PARAMS {
        let Some(value) = params.get(key) else {
            continue;
        };
        let raw = value.as_f64().ok_or_else(|| SchemaError::ParamTypeMismatch {
            key: key.to_owned(),
            expected: ParamKind::Number,
        })?;
        let port = raw.ceil();
        if !(1.0..=65535.0).contains(&port) {
            return Err(CoreError::Config(format!(
                "{key} must be a port between 1 and 65535, got {raw}"
            )));
        }
        let port = port as u16;
        if TcpListener::bind(("0.0.0.0", port)).is_err() {
            return Err(CoreError::PortInUse(port));
        }
        debug!("port {port} is free");
    }
    Ok(())
}
