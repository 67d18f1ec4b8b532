use serde_json::{json, Map, Value};
use stackyard_core::{CoreError, Engine, EngineConfig, GateError, InstallRequest, LinkError};
use stackyard_runtime::{MockCompose, MockExec};
use stackyard_schema::{CatalogStatus, InstallStatus};
use stackyard_store::{Repositories, StoreLayout};
use std::fs;
use std::path::Path;
use std::sync::Arc;

struct Harness {
    _dir: tempfile::TempDir,
    root: std::path::PathBuf,
    repos: Repositories,
    exec: Arc<MockExec>,
    compose: Arc<MockCompose>,
    engine: Engine,
}

fn write_template(resource: &Path, key: &str, version: &str, params: &Value) {
    let dir = resource.join("apps").join(key).join(version);
    fs::create_dir_all(&dir).unwrap();
    fs::write(
        dir.join("docker-compose.yml"),
        format!("services:\n  {key}:\n    image: {key}:{version}\n    container_name: ${{CONTAINER_NAME}}\n"),
    )
    .unwrap();
    fs::write(dir.join("params.json"), params.to_string()).unwrap();
}

fn harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().to_path_buf();
    let resource = root.join("resource");

    fs::create_dir_all(resource.join("apps")).unwrap();
    fs::write(
        resource.join("apps").join("list.json"),
        json!({
            "version": "1",
            "apps": [
                {"key": "mysql", "name": "MySQL", "type": "runtime", "limit": 1, "versions": ["8.0"]},
                {"key": "wordpress", "name": "WordPress", "type": "website",
                 "required": "[\"mysql\"]", "versions": ["6.4"]},
                {"key": "nginx", "name": "Nginx", "type": "tool", "versions": ["1.25"]}
            ]
        })
        .to_string(),
    )
    .unwrap();

    write_template(
        &resource,
        "mysql",
        "8.0",
        &json!({"fields": [
            {"key": "CONTAINER_NAME", "type": "string", "required": true},
            {"key": "PANEL_DB_ROOT_PASSWORD", "type": "string", "required": true},
            {"key": "PANEL_APP_PORT_HTTP", "type": "number"}
        ]}),
    );
    write_template(
        &resource,
        "wordpress",
        "6.4",
        &json!({"fields": [
            {"key": "CONTAINER_NAME", "type": "string", "required": true},
            {"key": "PANEL_DB_HOST", "type": "string"},
            {"key": "PANEL_DB_NAME", "type": "string"},
            {"key": "PANEL_DB_USER", "type": "string"},
            {"key": "PANEL_DB_USER_PASSWORD", "type": "string"}
        ]}),
    );
    write_template(
        &resource,
        "nginx",
        "1.25",
        &json!({"fields": [{"key": "CONTAINER_NAME", "type": "string", "required": true}]}),
    );

    let layout = StoreLayout::new(&root);
    layout.initialize().unwrap();
    let config = EngineConfig::default().rooted_at(&root);
    let repos = Repositories::in_memory();
    let exec = Arc::new(MockExec::new());
    let compose = Arc::new(MockCompose::new());
    let engine = Engine::with_parts(layout, config, repos.clone(), exec.clone(), compose.clone());
    engine.sync_catalog().unwrap();

    Harness {
        _dir: dir,
        root,
        repos,
        exec,
        compose,
        engine,
    }
}

fn request(key: &str, version: &str, name: &str, params: Value) -> InstallRequest {
    let params: Map<String, Value> = match params {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    InstallRequest {
        app_key: key.to_owned(),
        version: version.to_owned(),
        name: name.to_owned(),
        params,
    }
}

fn install_mysql(h: &Harness, name: &str) -> Result<stackyard_schema::AppInstall, CoreError> {
    h.engine.install(&request(
        "mysql",
        "8.0",
        name,
        json!({"CONTAINER_NAME": format!("1Panel-{name}"), "PANEL_DB_ROOT_PASSWORD": "rootpw"}),
    ))
}

fn wordpress_params(host: &str) -> Value {
    json!({
        "CONTAINER_NAME": "1Panel-wp",
        "PANEL_DB_HOST": host,
        "PANEL_DB_NAME": "wpdb",
        "PANEL_DB_USER": "wpuser",
        "PANEL_DB_USER_PASSWORD": "s3cret"
    })
}

#[test]
fn sync_populates_catalog() {
    let h = harness();
    let apps = h.engine.list_apps().unwrap();
    let keys: Vec<&str> = apps.iter().map(|a| a.app.key.as_str()).collect();
    assert_eq!(keys, vec!["mysql", "nginx", "wordpress"]);
    let wp = apps.iter().find(|a| a.app.key == "wordpress").unwrap();
    assert_eq!(wp.app.required, vec!["mysql".to_owned()]);
    assert_eq!(wp.versions.len(), 1);
    assert_eq!(wp.versions[0].status, CatalogStatus::Normal);
}

#[test]
fn runtime_install_runs_and_keeps_credentials() {
    let h = harness();
    let install = install_mysql(&h, "mysql-1").unwrap();
    assert_eq!(install.status, InstallStatus::Running);
    assert_eq!(install.container_name, "1Panel-mysql-1");
    assert_eq!(install.auth.as_ref().unwrap().root_password, "rootpw");

    let dir = h.root.join("apps").join("mysql").join("mysql-1");
    let env = fs::read_to_string(dir.join(".env")).unwrap();
    assert!(env.contains("PANEL_DB_ROOT_PASSWORD=\"rootpw\""));
    assert_eq!(h.compose.ups(), vec![dir.join("docker-compose.yml")]);

    let stored = h.engine.inspect("mysql-1").unwrap().install;
    assert_eq!(stored.status, InstallStatus::Running);
    assert!(stored.auth.is_some());
    let names = h.engine.container_names(&stored).unwrap();
    assert_eq!(names.len(), 1);
    assert_eq!(names[0], "1Panel-mysql-1");
}

#[test]
fn second_install_over_limit_is_rejected() {
    let h = harness();
    install_mysql(&h, "mysql-1").unwrap();
    let err = install_mysql(&h, "mysql-2").unwrap_err();
    assert!(matches!(
        err,
        CoreError::Gate(GateError::LimitExceeded { ref key, limit: 1 }) if key == "mysql"
    ));
    assert!(!h.root.join("apps/mysql/mysql-2").exists());
}

#[test]
fn concurrent_installs_respect_limit() {
    let h = harness();
    let results: Vec<bool> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let h = &h;
                s.spawn(move || install_mysql(h, &format!("mysql-{i}")).is_ok())
            })
            .collect();
        handles.into_iter().map(|t| t.join().unwrap()).collect()
    });
    assert_eq!(results.iter().filter(|ok| **ok).count(), 1);
    assert_eq!(h.engine.list_installs().unwrap().len(), 1);
}

#[test]
fn missing_requirement_is_rejected() {
    let h = harness();
    let err = h
        .engine
        .install(&request("wordpress", "6.4", "wp", wordpress_params("mysql-1")))
        .unwrap_err();
    assert!(matches!(
        err,
        CoreError::Gate(GateError::RequirementNotInstalled(ref k)) if k == "mysql"
    ));
}

#[test]
fn website_install_links_database() {
    let h = harness();
    let mysql = install_mysql(&h, "mysql-1").unwrap();
    let wp = h
        .engine
        .install(&request("wordpress", "6.4", "wp", wordpress_params("mysql-1")))
        .unwrap();
    assert_eq!(wp.status, InstallStatus::Running);

    let calls = h.exec.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].container, "1Panel-mysql-1");
    assert!(calls[0].command.contains("CREATE USER 'wpuser'@'%'"));

    let report = h.engine.inspect("wp").unwrap();
    assert_eq!(report.links.len(), 1);
    assert_eq!(report.links[0].provider.as_deref(), Some("mysql-1"));
    assert_eq!(report.links[0].database.as_ref().unwrap().name, "wpdb");

    let provider = h.engine.inspect("mysql-1").unwrap();
    assert_eq!(provider.hosted.len(), 1);
    assert_eq!(provider.hosted[0].app_install_id, mysql.id);
}

#[test]
fn numeric_looking_root_password_survives_to_provisioning() {
    let h = harness();
    h.engine
        .install(&request(
            "mysql",
            "8.0",
            "mysql-1",
            json!({"CONTAINER_NAME": "1Panel-mysql-1", "PANEL_DB_ROOT_PASSWORD": "0123"}),
        ))
        .unwrap();
    let env = fs::read_to_string(h.root.join("apps/mysql/mysql-1/.env")).unwrap();
    assert!(env.contains("PANEL_DB_ROOT_PASSWORD=\"0123\"\n"), "env: {env}");

    h.engine
        .install(&request("wordpress", "6.4", "wp", wordpress_params("mysql-1")))
        .unwrap();
    let calls = h.exec.calls();
    assert_eq!(calls.len(), 1);
    assert!(
        calls[0].command.starts_with("mysql -uroot -p'0123' "),
        "command: {}",
        calls[0].command
    );
}

#[test]
fn compose_project_is_named_after_the_install() {
    let h = harness();
    h.engine
        .install(&request(
            "nginx",
            "1.25",
            "Web.Site",
            json!({"CONTAINER_NAME": "1Panel-web"}),
        ))
        .unwrap();
    h.engine.uninstall("Web.Site").unwrap();
    assert_eq!(
        h.compose.projects(),
        vec!["website".to_owned(), "website".to_owned()]
    );
}

#[test]
fn uninstall_reverses_install() {
    let h = harness();
    install_mysql(&h, "mysql-1").unwrap();
    h.engine
        .install(&request("wordpress", "6.4", "wp", wordpress_params("mysql-1")))
        .unwrap();

    h.engine.uninstall("wp").unwrap();

    let calls = h.exec.calls();
    assert_eq!(calls.len(), 2);
    assert!(calls[1].command.contains("DROP DATABASE IF EXISTS wpdb"));
    assert_eq!(h.repos.databases.count(&[]).unwrap(), 0);
    assert_eq!(h.repos.resources.count(&[]).unwrap(), 0);
    assert_eq!(h.compose.downs().len(), 1);
    assert!(!h.root.join("apps/wordpress/wp").exists());
    assert!(matches!(
        h.engine.inspect("wp").unwrap_err(),
        CoreError::InstallNotFound(_)
    ));
}

#[test]
fn uninstall_failure_keeps_install_for_retry() {
    let h = harness();
    install_mysql(&h, "mysql-1").unwrap();
    h.engine
        .install(&request("wordpress", "6.4", "wp", wordpress_params("mysql-1")))
        .unwrap();

    h.exec.fail_with(Some("ERROR 2002 (HY000): Can't connect"));
    let err = h.engine.uninstall("wp").unwrap_err();
    assert!(matches!(err, CoreError::Link(LinkError::ProvisionFailed(_))));
    assert_eq!(h.repos.resources.count(&[]).unwrap(), 1);
    assert!(h.root.join("apps/wordpress/wp").exists());

    h.exec.fail_with(None);
    h.engine.uninstall("wp").unwrap();
    assert_eq!(h.repos.resources.count(&[]).unwrap(), 0);
}

#[test]
fn compose_failure_is_recorded_not_raised() {
    let h = harness();
    install_mysql(&h, "mysql-1").unwrap();
    h.compose
        .fail_up_with(Some("Error response from daemon: port is already allocated"));
    let wp = h
        .engine
        .install(&request("wordpress", "6.4", "wp", wordpress_params("mysql-1")))
        .unwrap();
    assert_eq!(wp.status, InstallStatus::Error);
    assert!(wp.message.contains("port is already allocated"));
    assert!(h.exec.calls().is_empty());
    assert_eq!(h.repos.databases.count(&[]).unwrap(), 0);

    let stored = h.engine.inspect("wp").unwrap().install;
    assert_eq!(stored.status, InstallStatus::Error);
}

#[test]
fn provisioning_failure_marks_install_and_rolls_back() {
    let h = harness();
    install_mysql(&h, "mysql-1").unwrap();
    h.exec.fail_with(Some("ERROR 1045 (28000): Access denied"));
    let err = h
        .engine
        .install(&request("wordpress", "6.4", "wp", wordpress_params("mysql-1")))
        .unwrap_err();
    assert!(matches!(err, CoreError::Link(LinkError::ProvisionFailed(_))));

    let stored = h.engine.inspect("wp").unwrap().install;
    assert_eq!(stored.status, InstallStatus::Error);
    assert!(stored.message.contains("Access denied"));
    assert_eq!(h.repos.databases.count(&[]).unwrap(), 0);
    assert_eq!(h.repos.resources.count(&[]).unwrap(), 0);
}

#[test]
fn undeclared_param_is_rejected_before_any_file_is_written() {
    let h = harness();
    let err = h
        .engine
        .install(&request(
            "nginx",
            "1.25",
            "web",
            json!({"CONTAINER_NAME": "web", "SURPRISE": 1}),
        ))
        .unwrap_err();
    assert!(matches!(err, CoreError::Materialize(_)));
    assert!(!h.root.join("apps/nginx/web").exists());
    assert!(h.engine.list_installs().unwrap().is_empty());
}

#[test]
fn duplicate_install_name_is_rejected() {
    let h = harness();
    let params = json!({"CONTAINER_NAME": "web"});
    h.engine
        .install(&request("nginx", "1.25", "web", params.clone()))
        .unwrap();
    let err = h
        .engine
        .install(&request("nginx", "1.25", "web", params))
        .unwrap_err();
    assert!(matches!(err, CoreError::Materialize(_)));
}

#[test]
fn unknown_app_and_version() {
    let h = harness();
    assert!(matches!(
        h.engine
            .install(&request("redis", "7", "r", json!({})))
            .unwrap_err(),
        CoreError::AppNotFound(_)
    ));
    assert!(matches!(
        h.engine
            .install(&request("nginx", "0.1", "r", json!({})))
            .unwrap_err(),
        CoreError::VersionNotFound { .. }
    ));
    assert!(matches!(
        h.engine.uninstall("nope").unwrap_err(),
        CoreError::InstallNotFound(_)
    ));
}

#[test]
fn resync_takes_down_removed_apps() {
    let h = harness();
    let list = h.root.join("resource/apps/list.json");
    fs::write(
        &list,
        json!({"apps": [{"key": "mysql", "type": "runtime", "limit": 1, "versions": ["8.0"]}]})
            .to_string(),
    )
    .unwrap();
    let report = h.engine.sync_catalog().unwrap();
    assert_eq!(report.apps_taken_down, 2);

    let apps = h.engine.list_apps().unwrap();
    assert_eq!(apps.len(), 3);
    let nginx = apps.iter().find(|a| a.app.key == "nginx").unwrap();
    assert_eq!(nginx.app.status, CatalogStatus::TakenDown);
}
