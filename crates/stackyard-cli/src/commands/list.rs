use super::{colorize_status, json_pretty, EXIT_SUCCESS};
use stackyard_core::Engine;

pub fn run(engine: &Engine, json: bool) -> Result<u8, String> {
    let mut installs = engine.list_installs().map_err(|e| e.to_string())?;
    installs.sort_by(|a, b| a.name.cmp(&b.name));
    if json {
        println!("{}", json_pretty(&installs)?);
    } else if installs.is_empty() {
        println!("no installs found");
    } else {
        println!("{:<20} {:<14} {:<10} {:<12} CONTAINER", "NAME", "APP", "VERSION", "STATUS");
        for install in &installs {
            let status = colorize_status(&install.status.to_string());
            println!(
                "{:<20} {:<14} {:<10} {:<12} {}",
                install.name, install.app_key, install.version, status, install.container_name
            );
        }
    }
    Ok(EXIT_SUCCESS)
}
