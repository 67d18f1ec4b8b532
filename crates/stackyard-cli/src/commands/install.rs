use super::{colorize_status, json_pretty, spin_fail, spin_ok, spinner, EXIT_FAILURE, EXIT_SUCCESS};
use serde_json::{Map, Value};
use stackyard_core::{Engine, InstallRequest};
use stackyard_schema::InstallStatus;
use std::path::{Path, PathBuf};

pub struct InstallArgs {
    pub key: String,
    pub version: String,
    pub name: String,
    pub params: Vec<String>,
    pub json_params: Vec<String>,
    pub params_file: Option<PathBuf>,
}

pub fn run(engine: &Engine, args: InstallArgs, json: bool) -> Result<u8, String> {
    let params = collect_params(&args.params, &args.json_params, args.params_file.as_deref())?;
    let request = InstallRequest {
        app_key: args.key,
        version: args.version,
        name: args.name,
        params,
    };

    let pb = (!json).then(|| {
        spinner(&format!(
            "installing {} {} as '{}'...",
            request.app_key, request.version, request.name
        ))
    });
    let install = match engine.install(&request) {
        Ok(install) => install,
        Err(e) => {
            if let Some(pb) = &pb {
                spin_fail(pb, &format!("install of '{}' failed", request.name));
            }
            return Err(e.to_string());
        }
    };

    let code = if install.status == InstallStatus::Running {
        EXIT_SUCCESS
    } else {
        EXIT_FAILURE
    };
    if json {
        println!("{}", json_pretty(&install)?);
    } else if let Some(pb) = &pb {
        let status = colorize_status(&install.status.to_string());
        if code == EXIT_SUCCESS {
            spin_ok(pb, &format!("installed '{}' ({status})", install.name));
        } else {
            spin_fail(pb, &format!("installed '{}' ({status})", install.name));
            if !install.message.is_empty() {
                eprintln!("{}", install.message);
            }
        }
    }
    Ok(code)
}

/// Merge install parameters: the params file first, then `KEY=VALUE`
/// strings, then `KEY=JSON` typed values. Later sources override earlier ones.
pub fn collect_params(
    pairs: &[String],
    json_pairs: &[String],
    file: Option<&Path>,
) -> Result<Map<String, Value>, String> {
    let mut params = match file {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .map_err(|e| format!("failed to read {}: {e}", path.display()))?;
            match serde_json::from_str::<Value>(&content)
                .map_err(|e| format!("failed to parse {}: {e}", path.display()))?
            {
                Value::Object(map) => map,
                _ => return Err(format!("{} must contain a JSON object", path.display())),
            }
        }
        None => Map::new(),
    };

    for pair in pairs {
        let (key, value) = split_pair(pair)?;
        params.insert(key.to_owned(), Value::String(value.to_owned()));
    }
    for pair in json_pairs {
        let (key, value) = split_pair(pair)?;
        let value = serde_json::from_str(value)
            .map_err(|e| format!("invalid JSON for parameter '{key}': {e}"))?;
        params.insert(key.to_owned(), value);
    }
    Ok(params)
}

fn split_pair(pair: &str) -> Result<(&str, &str), String> {
    match pair.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key, value)),
        _ => Err(format!("invalid parameter '{pair}', expected KEY=VALUE")),
    }
}
