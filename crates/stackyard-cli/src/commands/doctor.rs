use super::{EXIT_FAILURE, EXIT_SUCCESS};
use stackyard_core::{DirectoryCatalogSource, EngineConfig, StoreLock};
use stackyard_store::StoreLayout;
use std::path::Path;

pub fn run(store_path: &Path, config: &EngineConfig, json_output: bool) -> Result<u8, String> {
    let mut checks: Vec<Check> = Vec::new();
    let mut all_pass = true;

    check_prereqs(config, &mut checks, &mut all_pass);

    let layout = StoreLayout::new(store_path);
    if layout.store_dir().exists() {
        checks.push(Check::pass("store_exists", "Store directory exists"));
        check_store(&layout, &mut checks, &mut all_pass);
    } else {
        checks.push(Check::info(
            "store_exists",
            "Store not initialized (will be created on first use)",
        ));
    }

    check_catalog(config, &mut checks);

    print_results(&checks, all_pass, json_output)
}

fn check_prereqs(config: &EngineConfig, checks: &mut Vec<Check>, all_pass: &mut bool) {
    if config.backend != "docker" {
        checks.push(Check::info(
            "runtime_prereqs",
            &format!("Backend '{}' needs no host tools", config.backend),
        ));
        return;
    }
    let missing = stackyard_runtime::check_docker_prereqs(&config.docker_bin);
    if missing.is_empty() {
        checks.push(Check::pass(
            "runtime_prereqs",
            "Runtime prerequisites satisfied",
        ));
    } else {
        *all_pass = false;
        checks.push(Check::fail(
            "runtime_prereqs",
            &stackyard_runtime::format_missing(&missing),
        ));
    }
}

fn check_store(layout: &StoreLayout, checks: &mut Vec<Check>, all_pass: &mut bool) {
    match layout.verify_version() {
        Ok(()) => checks.push(Check::pass("store_version", "Store format version valid")),
        Err(e) => {
            *all_pass = false;
            checks.push(Check::fail(
                "store_version",
                &format!("Store version check failed: {e}"),
            ));
        }
    }

    match StoreLock::try_acquire(&layout.sync_lock()) {
        Ok(Some(_)) => checks.push(Check::pass("sync_lock", "No catalog sync in progress")),
        Ok(None) => checks.push(Check::warn(
            "sync_lock",
            "A catalog sync is running in another process",
        )),
        Err(e) => {
            *all_pass = false;
            checks.push(Check::fail(
                "sync_lock",
                &format!("Cannot check sync lock: {e}"),
            ));
        }
    }
}

fn check_catalog(config: &EngineConfig, checks: &mut Vec<Check>) {
    let list = DirectoryCatalogSource::new(&config.resource_dir).list_path();
    if list.exists() {
        checks.push(Check::pass(
            "catalog_source",
            &format!("App list found at {}", list.display()),
        ));
    } else {
        checks.push(Check::warn(
            "catalog_source",
            &format!("No app list at {} (sync will fail)", list.display()),
        ));
    }
}

fn print_results(checks: &[Check], all_pass: bool, json_output: bool) -> Result<u8, String> {
    if json_output {
        let json = serde_json::json!({
            "healthy": all_pass,
            "checks": checks.iter().map(|c| serde_json::json!({
                "name": c.name,
                "status": c.status,
                "message": c.message,
            })).collect::<Vec<_>>(),
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&json).map_err(|e| e.to_string())?
        );
    } else {
        println!("Stackyard Doctor\n");
        for check in checks {
            let icon = match check.status {
                "pass" => "✓",
                "fail" => "✗",
                "warn" => "⚠",
                _ => "ℹ",
            };
            println!("  {icon} {}", check.message);
        }
        println!();
        if all_pass {
            println!("All checks passed.");
        } else {
            println!("Some checks failed. See above for details.");
        }
    }
    Ok(if all_pass { EXIT_SUCCESS } else { EXIT_FAILURE })
}

struct Check {
    name: &'static str,
    status: &'static str,
    message: String,
}

impl Check {
    fn new(name: &'static str, status: &'static str, message: &str) -> Self {
        Self {
            name,
            status,
            message: message.to_owned(),
        }
    }

    fn pass(name: &'static str, message: &str) -> Self {
        Self::new(name, "pass", message)
    }

    fn fail(name: &'static str, message: &str) -> Self {
        Self::new(name, "fail", message)
    }

    fn warn(name: &'static str, message: &str) -> Self {
        Self::new(name, "warn", message)
    }

    fn info(name: &'static str, message: &str) -> Self {
        Self::new(name, "info", message)
    }
}
