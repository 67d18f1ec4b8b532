use super::{json_pretty, spin_fail, spin_ok, spinner, EXIT_SUCCESS};
use stackyard_core::Engine;

pub fn run(engine: &Engine, json: bool) -> Result<u8, String> {
    let pb = (!json).then(|| spinner("syncing catalog..."));
    let report = match engine.sync_catalog() {
        Ok(report) => report,
        Err(e) => {
            if let Some(pb) = &pb {
                spin_fail(pb, "catalog sync failed");
            }
            return Err(e.to_string());
        }
    };

    if json {
        println!("{}", json_pretty(&report)?);
    } else if let Some(pb) = &pb {
        spin_ok(
            pb,
            &format!(
                "catalog synced: {} added, {} updated, {} taken down, {} new version(s)",
                report.apps_added,
                report.apps_updated,
                report.apps_taken_down,
                report.versions_added
            ),
        );
    }
    Ok(EXIT_SUCCESS)
}
