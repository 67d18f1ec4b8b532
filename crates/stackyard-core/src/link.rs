use stackyard_runtime::{is_database_engine, ContainerExecSpec, DatabaseOp, ResourceProvisioner};
use stackyard_schema::{
    App, AppInstall, AppInstallResource, AppType, AuthParam, Database, DatabaseBinding, RecordId,
    ResolvedParams,
};
use stackyard_store::{DatabaseFilter, InstallFilter, Repository, ResourceFilter, StoreError};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("invalid binding parameters: {0}")]
    InvalidBindingParams(String),
    #[error("no install provides service '{0}'")]
    ProviderNotFound(String),
    #[error("provisioning failed: {0}")]
    ProvisionFailed(String),
    #[error("failed to persist link: {0}")]
    PersistenceError(#[from] StoreError),
}

/// A row written while linking that has to be removed if a later step fails.
#[derive(Debug, Clone, Copy)]
enum Compensation {
    Database(RecordId),
    Resource(RecordId),
}

/// Creates and tears down database resources shared between installs.
///
/// Linking writes a [`Database`] row, then an [`AppInstallResource`] row,
/// then provisions the database inside the provider's container. Each write
/// is journaled; when a later step fails the journal is unwound in reverse
/// so no half-created link survives.
pub struct LinkManager {
    installs: Arc<dyn Repository<AppInstall>>,
    databases: Arc<dyn Repository<Database>>,
    resources: Arc<dyn Repository<AppInstallResource>>,
    provisioner: ResourceProvisioner,
}

impl LinkManager {
    pub fn new(
        installs: Arc<dyn Repository<AppInstall>>,
        databases: Arc<dyn Repository<Database>>,
        resources: Arc<dyn Repository<AppInstallResource>>,
        provisioner: ResourceProvisioner,
    ) -> Self {
        Self {
            installs,
            databases,
            resources,
            provisioner,
        }
    }

    /// Establish whatever binding `app`'s kind declares through `params`.
    ///
    /// Runtime apps keep their root credentials on the install itself. The
    /// caller is responsible for saving `install` afterwards. Website apps
    /// get a database in the provider install named by the binding, if a
    /// binding was requested.
    pub fn create_link(
        &self,
        app: &App,
        install: &mut AppInstall,
        params: &ResolvedParams,
    ) -> Result<(), LinkError> {
        if !app.app_type.declares_binding() {
            debug!("{} app '{}' declares no binding", app.app_type, app.key);
            return Ok(());
        }
        if app.app_type == AppType::Runtime {
            let auth = AuthParam::from_params(params)
                .map_err(|e| LinkError::InvalidBindingParams(e.to_string()))?;
            install.auth = Some(auth);
            debug!("stored root credentials on install '{}'", install.name);
            return Ok(());
        }

        let binding = DatabaseBinding::from_params(params)
            .map_err(|e| LinkError::InvalidBindingParams(e.to_string()))?;
        match binding {
            Some(binding) => self.link_database(install, &binding),
            None => {
                debug!("install '{}' requests no database", install.name);
                Ok(())
            }
        }
    }

    fn link_database(
        &self,
        install: &AppInstall,
        binding: &DatabaseBinding,
    ) -> Result<(), LinkError> {
        validate_identifier("database name", &binding.db_name)?;
        validate_identifier("database user", &binding.db_user)?;

        let provider = self
            .installs
            .get_first(&[InstallFilter::ServiceName(binding.service_name.clone())])?
            .ok_or_else(|| LinkError::ProviderNotFound(binding.service_name.to_string()))?;
        let engine = provider.app_key.to_string();

        let mut journal = Vec::new();
        let mut database = Database {
            id: RecordId::UNSET,
            engine: engine.clone(),
            name: binding.db_name.clone(),
            username: binding.db_user.clone(),
            password: binding.password.clone(),
            app_install_id: provider.id,
        };
        self.databases.create(&mut database)?;
        journal.push(Compensation::Database(database.id));

        let mut link = AppInstallResource {
            id: RecordId::UNSET,
            consumer_install_id: install.id,
            resource_id: database.id,
            provider_install_id: provider.id,
            engine,
        };
        if let Err(e) = self.resources.create(&mut link) {
            self.unwind(journal);
            return Err(e.into());
        }
        journal.push(Compensation::Resource(link.id));

        if let Err(e) = self.provision(&database, &provider, DatabaseOp::Create) {
            self.unwind(journal);
            return Err(e);
        }

        info!(
            "linked install '{}' to database '{}' in '{}'",
            install.name, database.name, provider.name
        );
        Ok(())
    }

    /// Drop every database `install` consumes and remove the link rows.
    ///
    /// Links whose database row or provider install is gone are skipped. A
    /// database row that cannot be read, or a failed drop command, aborts the
    /// teardown and leaves all rows in place so the operation can be retried.
    pub fn delete_link(&self, install: &AppInstall) -> Result<(), LinkError> {
        let links = self
            .resources
            .get_by(&[ResourceFilter::ConsumerInstallId(install.id)])?;
        if links.is_empty() {
            return Ok(());
        }

        let mut database_ids = Vec::new();
        for link in &links {
            if !is_database_engine(&link.engine) {
                debug!("link {} uses engine '{}', nothing to drop", link.id, link.engine);
                continue;
            }
            let Some(database) = self
                .databases
                .get_first(&[DatabaseFilter::Id(link.resource_id)])?
            else {
                debug!("database {} already removed", link.resource_id);
                continue;
            };
            database_ids.push(database.id);

            let Some(provider) = self
                .installs
                .get_first(&[InstallFilter::Id(database.app_install_id)])?
            else {
                warn!(
                    "provider install {} of database '{}' is gone, dropping the record only",
                    database.app_install_id, database.name
                );
                continue;
            };
            self.provision(&database, &provider, DatabaseOp::Delete)?;
        }

        if !database_ids.is_empty() {
            self.databases
                .delete_by(&[DatabaseFilter::IdsIn(database_ids)])?;
        }
        let removed = self
            .resources
            .delete_by(&[ResourceFilter::ConsumerInstallId(install.id)])?;
        info!("removed {removed} link(s) of install '{}'", install.name);
        Ok(())
    }

    fn provision(
        &self,
        database: &Database,
        provider: &AppInstall,
        op: DatabaseOp,
    ) -> Result<(), LinkError> {
        if provider.container_name.is_empty() {
            return Err(LinkError::ProvisionFailed(format!(
                "provider install '{}' has no container",
                provider.name
            )));
        }
        let auth = match &provider.auth {
            Some(auth) => auth.clone(),
            None => AuthParam::from_params(&provider.params).map_err(|_| {
                LinkError::ProvisionFailed(format!(
                    "provider install '{}' has no root credentials",
                    provider.name
                ))
            })?,
        };
        let spec = ContainerExecSpec {
            root_password: auth.root_password,
            db_user: database.username.clone(),
            db_name: database.name.clone(),
            password: database.password.clone(),
        };

        match self
            .provisioner
            .provision(&database.engine, op, &provider.container_name, &spec)
        {
            Ok(Some(_)) => Ok(()),
            Ok(None) => {
                debug!("engine '{}' needs no provisioning", database.engine);
                Ok(())
            }
            Err(e) => Err(LinkError::ProvisionFailed(e.to_string())),
        }
    }

    fn unwind(&self, journal: Vec<Compensation>) {
        for step in journal.into_iter().rev() {
            let result = match step {
                Compensation::Database(id) => self.databases.delete_by(&[DatabaseFilter::Id(id)]),
                Compensation::Resource(id) => self.resources.delete_by(&[ResourceFilter::Id(id)]),
            };
            match result {
                Ok(_) => debug!("rolled back {step:?}"),
                Err(e) => warn!("failed to roll back {step:?}: {e}"),
            }
        }
    }
}

/// Database names and users go into SQL unquoted, so only `[A-Za-z0-9_]` is accepted.
fn validate_identifier(what: &str, value: &str) -> Result<(), LinkError> {
    if value.is_empty() {
        return Err(LinkError::InvalidBindingParams(format!("{what} is empty")));
    }
    if !value.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(LinkError::InvalidBindingParams(format!(
            "{what} '{value}' may only contain letters, digits and '_'"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use stackyard_runtime::MockExec;
    use stackyard_schema::binding::{
        DB_HOST_KEY, DB_NAME_KEY, DB_PASSWORD_KEY, DB_USER_KEY, ROOT_PASSWORD_KEY,
    };
    use stackyard_schema::ContainerName;
    use stackyard_store::{JsonRepository, MemoryRepository, Record, StoreLayout};

    struct Fixture {
        installs: Arc<MemoryRepository<AppInstall>>,
        databases: Arc<MemoryRepository<Database>>,
        resources: Arc<MemoryRepository<AppInstallResource>>,
        exec: Arc<MockExec>,
        manager: LinkManager,
    }

    fn fixture() -> Fixture {
        let installs = Arc::new(MemoryRepository::new());
        let databases = Arc::new(MemoryRepository::new());
        let resources = Arc::new(MemoryRepository::new());
        let exec = Arc::new(MockExec::new());
        let manager = LinkManager::new(
            installs.clone(),
            databases.clone(),
            resources.clone(),
            ResourceProvisioner::new(exec.clone()),
        );
        Fixture {
            installs,
            databases,
            resources,
            exec,
            manager,
        }
    }

    fn add_install(f: &Fixture, key: &str, name: &str, auth: Option<&str>) -> AppInstall {
        let mut install = AppInstall {
            name: name.to_owned(),
            app_key: key.into(),
            service_name: name.into(),
            container_name: ContainerName::new(format!("1Panel-{name}")),
            auth: auth.map(|p| AuthParam {
                root_password: p.to_owned(),
            }),
            ..AppInstall::default()
        };
        f.installs.create(&mut install).unwrap();
        install
    }

    fn website() -> App {
        let mut app = App::new("wordpress");
        app.app_type = AppType::Website;
        app
    }

    fn binding(provider: &str) -> ResolvedParams {
        ResolvedParams::new()
            .with(DB_HOST_KEY, provider)
            .with(DB_NAME_KEY, "wpdb")
            .with(DB_USER_KEY, "wpuser")
            .with(DB_PASSWORD_KEY, "s3cret")
    }

    #[test]
    fn runtime_app_keeps_root_credentials() {
        let f = fixture();
        let mut app = App::new("mysql");
        app.app_type = AppType::Runtime;
        let mut install = add_install(&f, "mysql", "mysql-1", None);

        let params = ResolvedParams::new().with(ROOT_PASSWORD_KEY, "rootpw");
        f.manager.create_link(&app, &mut install, &params).unwrap();
        assert_eq!(install.auth.unwrap().root_password, "rootpw");
        assert!(f.databases.is_empty());
        assert!(f.exec.calls().is_empty());
    }

    #[test]
    fn runtime_app_without_root_password_is_rejected() {
        let f = fixture();
        let mut app = App::new("mysql");
        app.app_type = AppType::Runtime;
        let mut install = add_install(&f, "mysql", "mysql-1", None);
        let err = f
            .manager
            .create_link(&app, &mut install, &ResolvedParams::new())
            .unwrap_err();
        assert!(matches!(err, LinkError::InvalidBindingParams(_)));
    }

    #[test]
    fn tool_apps_are_left_alone() {
        let f = fixture();
        let mut app = App::new("ftp");
        app.app_type = AppType::Tool;
        let mut install = add_install(&f, "ftp", "ftp-1", None);
        f.manager
            .create_link(&app, &mut install, &binding("anything"))
            .unwrap();
        assert!(f.databases.is_empty());
        assert!(f.resources.is_empty());
    }

    #[test]
    fn website_without_binding_is_noop() {
        let f = fixture();
        let mut install = add_install(&f, "wordpress", "wp", None);
        let params = ResolvedParams::new().with("PANEL_APP_PORT_HTTP", 8080.0);
        f.manager
            .create_link(&website(), &mut install, &params)
            .unwrap();
        assert!(f.databases.is_empty());
        assert!(f.exec.calls().is_empty());
    }

    #[test]
    fn partial_binding_is_rejected() {
        let f = fixture();
        let mut install = add_install(&f, "wordpress", "wp", None);
        let params = ResolvedParams::new().with(DB_NAME_KEY, "wpdb");
        let err = f
            .manager
            .create_link(&website(), &mut install, &params)
            .unwrap_err();
        assert!(matches!(err, LinkError::InvalidBindingParams(_)));
        assert!(f.databases.is_empty());
    }

    #[test]
    fn unsafe_identifier_is_rejected() {
        let f = fixture();
        add_install(&f, "mysql", "mysql-1", Some("rootpw"));
        let mut install = add_install(&f, "wordpress", "wp", None);
        let params = binding("mysql-1").with(DB_NAME_KEY, "wp; DROP DATABASE x");
        let err = f
            .manager
            .create_link(&website(), &mut install, &params)
            .unwrap_err();
        assert!(matches!(err, LinkError::InvalidBindingParams(_)));
        assert!(f.exec.calls().is_empty());
    }

    #[test]
    fn missing_provider() {
        let f = fixture();
        let mut install = add_install(&f, "wordpress", "wp", None);
        let err = f
            .manager
            .create_link(&website(), &mut install, &binding("mysql-9"))
            .unwrap_err();
        assert!(matches!(err, LinkError::ProviderNotFound(s) if s == "mysql-9"));
    }

    #[test]
    fn website_link_creates_one_database_one_link_one_command() {
        let f = fixture();
        let provider = add_install(&f, "mysql", "mysql-1", Some("rootpw"));
        let mut install = add_install(&f, "wordpress", "wp", None);
        f.manager
            .create_link(&website(), &mut install, &binding("mysql-1"))
            .unwrap();

        let databases = f.databases.get_by(&[]).unwrap();
        assert_eq!(databases.len(), 1);
        assert_eq!(databases[0].engine, "mysql");
        assert_eq!(databases[0].app_install_id, provider.id);

        let links = f.resources.get_by(&[]).unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].consumer_install_id, install.id);
        assert_eq!(links[0].resource_id, databases[0].id);
        assert_eq!(links[0].provider_install_id, provider.id);

        let calls = f.exec.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].container, "1Panel-mysql-1");
        assert!(calls[0].command.contains("-p'rootpw'"));
        assert!(calls[0].command.contains("CREATE DATABASE wpdb"));
    }

    #[test]
    fn create_then_delete_is_symmetric() {
        let f = fixture();
        add_install(&f, "mysql", "mysql-1", Some("rootpw"));
        let mut install = add_install(&f, "wordpress", "wp", None);
        f.manager
            .create_link(&website(), &mut install, &binding("mysql-1"))
            .unwrap();
        f.manager.delete_link(&install).unwrap();

        assert!(f.databases.is_empty());
        assert!(f.resources.is_empty());
        let calls = f.exec.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].command.contains("CREATE DATABASE"));
        assert!(calls[1].command.contains("DROP DATABASE IF EXISTS wpdb"));
    }

    #[test]
    fn provisioning_failure_rolls_back_rows() {
        let f = fixture();
        add_install(&f, "mysql", "mysql-1", Some("rootpw"));
        let mut install = add_install(&f, "wordpress", "wp", None);
        f.exec.fail_with(Some("ERROR 1045 (28000): Access denied"));

        let err = f
            .manager
            .create_link(&website(), &mut install, &binding("mysql-1"))
            .unwrap_err();
        match err {
            LinkError::ProvisionFailed(out) => assert!(out.contains("Access denied")),
            other => panic!("expected ProvisionFailed, got {other:?}"),
        }
        assert!(f.databases.is_empty());
        assert!(f.resources.is_empty());
    }

    #[test]
    fn link_write_failure_rolls_back_database_row() {
        let f = fixture();
        add_install(&f, "mysql", "mysql-1", Some("rootpw"));
        let mut install = add_install(&f, "wordpress", "wp", None);
        f.resources.set_fail_writes(true);

        let err = f
            .manager
            .create_link(&website(), &mut install, &binding("mysql-1"))
            .unwrap_err();
        assert!(matches!(err, LinkError::PersistenceError(_)));
        assert!(f.databases.is_empty());
        assert!(f.exec.calls().is_empty());
    }

    #[test]
    fn provider_without_credentials_cannot_provision() {
        let f = fixture();
        add_install(&f, "mysql", "mysql-1", None);
        let mut install = add_install(&f, "wordpress", "wp", None);
        let err = f
            .manager
            .create_link(&website(), &mut install, &binding("mysql-1"))
            .unwrap_err();
        assert!(matches!(err, LinkError::ProvisionFailed(_)));
        assert!(f.databases.is_empty());
    }

    #[test]
    fn delete_without_links_runs_nothing() {
        let f = fixture();
        let install = add_install(&f, "wordpress", "wp", None);
        f.manager.delete_link(&install).unwrap();
        assert!(f.exec.calls().is_empty());
    }

    #[test]
    fn delete_skips_missing_database_and_provider() {
        let f = fixture();
        let provider = add_install(&f, "mysql", "mysql-1", Some("rootpw"));
        let mut install = add_install(&f, "wordpress", "wp", None);
        f.manager
            .create_link(&website(), &mut install, &binding("mysql-1"))
            .unwrap();

        // a dangling link whose database row is already gone
        let mut dangling = AppInstallResource {
            consumer_install_id: install.id,
            resource_id: RecordId::new(999),
            provider_install_id: provider.id,
            engine: "mysql".to_owned(),
            ..AppInstallResource::default()
        };
        f.resources.create(&mut dangling).unwrap();

        f.installs
            .delete_by(&[InstallFilter::Id(provider.id)])
            .unwrap();
        f.manager.delete_link(&install).unwrap();

        assert_eq!(f.exec.calls().len(), 1); // only the create
        assert!(f.databases.is_empty());
        assert!(f.resources.is_empty());
    }

    #[test]
    fn delete_failure_keeps_rows_for_retry() {
        let f = fixture();
        add_install(&f, "mysql", "mysql-1", Some("rootpw"));
        let mut install = add_install(&f, "wordpress", "wp", None);
        f.manager
            .create_link(&website(), &mut install, &binding("mysql-1"))
            .unwrap();

        f.exec.fail_with(Some("ERROR 2002: can't connect"));
        let err = f.manager.delete_link(&install).unwrap_err();
        assert!(matches!(err, LinkError::ProvisionFailed(_)));
        assert_eq!(f.databases.len(), 1);
        assert_eq!(f.resources.len(), 1);

        f.exec.fail_with(None);
        f.manager.delete_link(&install).unwrap();
        assert!(f.databases.is_empty());
        assert!(f.resources.is_empty());
    }

    #[test]
    fn delete_fails_on_tampered_database_row() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StoreLayout::new(dir.path());
        let installs = Arc::new(MemoryRepository::new());
        let databases = Arc::new(JsonRepository::<Database>::new(layout.clone()));
        let resources = Arc::new(MemoryRepository::new());
        let exec = Arc::new(MockExec::new());
        let manager = LinkManager::new(
            installs.clone(),
            databases.clone(),
            resources.clone(),
            ResourceProvisioner::new(exec.clone()),
        );

        let mut provider = AppInstall {
            name: "mysql-1".to_owned(),
            app_key: "mysql".into(),
            service_name: "mysql-1".into(),
            auth: Some(AuthParam {
                root_password: "rootpw".to_owned(),
            }),
            ..AppInstall::default()
        };
        installs.create(&mut provider).unwrap();
        let mut install = AppInstall {
            name: "wp".to_owned(),
            app_key: "wordpress".into(),
            service_name: "wp".into(),
            ..AppInstall::default()
        };
        installs.create(&mut install).unwrap();
        manager
            .create_link(&website(), &mut install, &binding("mysql-1"))
            .unwrap();

        let path = layout
            .record_kind_dir(Database::KIND)
            .join(format!("{}.json", RecordId::new(1)));
        let content = std::fs::read_to_string(&path).unwrap();
        std::fs::write(&path, content.replace("wpuser", "intruder")).unwrap();

        let err = manager.delete_link(&install).unwrap_err();
        assert!(matches!(
            err,
            LinkError::PersistenceError(StoreError::IntegrityFailure { .. })
        ));
        assert_eq!(resources.len(), 1);
        assert_eq!(exec.calls().len(), 1); // only the create
        assert!(path.exists());
    }

    #[test]
    fn non_database_links_are_only_unrecorded() {
        let f = fixture();
        let install = add_install(&f, "wordpress", "wp", None);
        let mut link = AppInstallResource {
            consumer_install_id: install.id,
            resource_id: RecordId::new(5),
            engine: "redis".to_owned(),
            ..AppInstallResource::default()
        };
        f.resources.create(&mut link).unwrap();
        f.manager.delete_link(&install).unwrap();
        assert!(f.resources.is_empty());
        assert!(f.exec.calls().is_empty());
    }
}
