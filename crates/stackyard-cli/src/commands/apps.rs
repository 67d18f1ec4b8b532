use super::{colorize_status, json_pretty, EXIT_SUCCESS};
use stackyard_core::Engine;
use stackyard_schema::CatalogStatus;

pub fn run(engine: &Engine, json: bool) -> Result<u8, String> {
    let apps = engine.list_apps().map_err(|e| e.to_string())?;
    if json {
        println!("{}", json_pretty(&apps)?);
    } else if apps.is_empty() {
        println!("catalog is empty (run 'stackyard sync')");
    } else {
        println!("{:<16} {:<10} {:<12} {:<6} VERSIONS", "KEY", "TYPE", "STATUS", "LIMIT");
        for listing in &apps {
            let app = &listing.app;
            let versions: Vec<&str> = listing
                .versions
                .iter()
                .filter(|v| v.status == CatalogStatus::Normal)
                .map(|v| v.version.as_str())
                .collect();
            let limit = if app.limit == 0 {
                "-".to_owned()
            } else {
                app.limit.to_string()
            };
            println!(
                "{:<16} {:<10} {:<12} {:<6} {}",
                app.key,
                app.app_type.to_string(),
                colorize_status(&app.status.to_string()),
                limit,
                versions.join(", ")
            );
        }
    }
    Ok(EXIT_SUCCESS)
}
