use super::{colorize_status, json_pretty, EXIT_SUCCESS};
use stackyard_core::Engine;

pub fn run(engine: &Engine, name: &str, json: bool) -> Result<u8, String> {
    let report = engine.inspect(name).map_err(|e| e.to_string())?;
    if json {
        println!("{}", json_pretty(&report)?);
        return Ok(EXIT_SUCCESS);
    }

    let install = &report.install;
    println!("name:        {}", install.name);
    println!("app:         {} {}", install.app_key, install.version);
    println!("status:      {}", colorize_status(&install.status.to_string()));
    if !install.message.is_empty() {
        println!("message:     {}", install.message);
    }
    println!("service:     {}", install.service_name);
    println!("container:   {}", install.container_name);
    println!("params:      {}", install.params.len());
    println!("created_at:  {}", install.created_at);
    println!("updated_at:  {}", install.updated_at);

    if !report.links.is_empty() {
        println!("links:");
        for view in &report.links {
            let provider = view.provider.as_deref().unwrap_or("(gone)");
            match &view.database {
                Some(db) => println!("  {} database '{}' on {provider}", db.engine, db.name),
                None => println!("  resource {} on {provider} (missing)", view.link.resource_id),
            }
        }
    }
    if !report.hosted.is_empty() {
        println!("hosted databases:");
        for db in &report.hosted {
            println!("  {} (user {})", db.name, db.username);
        }
    }
    Ok(EXIT_SUCCESS)
}
