use super::{json_pretty, spin_fail, spin_ok, spinner, EXIT_SUCCESS};
use stackyard_core::Engine;

pub fn run(engine: &Engine, name: &str, json: bool) -> Result<u8, String> {
    let pb = (!json).then(|| spinner(&format!("uninstalling '{name}'...")));
    if let Err(e) = engine.uninstall(name) {
        if let Some(pb) = &pb {
            spin_fail(pb, &format!("uninstall of '{name}' failed"));
        }
        return Err(e.to_string());
    }

    if json {
        let payload = serde_json::json!({ "name": name, "removed": true });
        println!("{}", json_pretty(&payload)?);
    } else if let Some(pb) = &pb {
        spin_ok(pb, &format!("uninstalled '{name}'"));
    }
    Ok(EXIT_SUCCESS)
}
