mod commands;

use clap::{Parser, Subcommand};
use commands::EXIT_FAILURE;
use stackyard_core::{Engine, EngineConfig};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "stackyard",
    version,
    about = "Install container apps from a catalog and link them to shared databases"
)]
struct Cli {
    /// Path to the Stackyard store directory.
    #[arg(long, default_value = "~/.local/share/stackyard")]
    store: String,

    /// Engine config file (defaults to stackyard.toml in the store).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Reconcile the local catalog with the app list in the resource directory.
    Sync,
    /// Install an app version.
    Install {
        /// App key from the catalog, e.g. "mysql".
        key: String,
        /// Catalog version to install.
        version: String,
        /// Install name; also the directory and service name.
        #[arg(long)]
        name: String,
        /// String parameter as KEY=VALUE. Repeatable.
        #[arg(long = "param", value_name = "KEY=VALUE")]
        params: Vec<String>,
        /// Typed parameter as KEY=JSON, e.g. PANEL_APP_PORT_HTTP=8080. Repeatable.
        #[arg(long = "param-json", value_name = "KEY=JSON")]
        json_params: Vec<String>,
        /// JSON object of parameters, merged before --param and --param-json.
        #[arg(long)]
        params_file: Option<PathBuf>,
    },
    /// Remove an install and the databases it consumes.
    Uninstall {
        /// Install name.
        name: String,
    },
    /// List installs.
    List,
    /// List catalog apps and their versions.
    Apps,
    /// Show an install with its links and hosted databases.
    Inspect {
        /// Install name.
        name: String,
    },
    /// Run diagnostic checks on the system and store.
    Doctor,
}

fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("STACKYARD_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    let store_path = expand_tilde(&cli.store);
    let json_output = cli.json;

    let config = match EngineConfig::for_store(&store_path, cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => return exit_with(&e.to_string()),
    };

    if let Commands::Doctor = cli.command {
        return finish(commands::doctor::run(&store_path, &config, json_output));
    }

    let needs_docker = matches!(
        cli.command,
        Commands::Install { .. } | Commands::Uninstall { .. }
    ) && config.backend == "docker";
    if needs_docker && std::env::var("STACKYARD_SKIP_PREREQS").as_deref() != Ok("1") {
        let missing = stackyard_runtime::check_docker_prereqs(&config.docker_bin);
        if !missing.is_empty() {
            eprintln!("error: {}", stackyard_runtime::format_missing(&missing));
            return ExitCode::from(EXIT_FAILURE);
        }
    }

    let engine = match Engine::open(&store_path, config) {
        Ok(engine) => engine,
        Err(e) => return exit_with(&e.to_string()),
    };

    let result = match cli.command {
        Commands::Sync => commands::sync::run(&engine, json_output),
        Commands::Install {
            key,
            version,
            name,
            params,
            json_params,
            params_file,
        } => commands::install::run(
            &engine,
            commands::install::InstallArgs {
                key,
                version,
                name,
                params,
                json_params,
                params_file,
            },
            json_output,
        ),
        Commands::Uninstall { name } => commands::uninstall::run(&engine, &name, json_output),
        Commands::List => commands::list::run(&engine, json_output),
        Commands::Apps => commands::apps::run(&engine, json_output),
        Commands::Inspect { name } => commands::inspect::run(&engine, &name, json_output),
        Commands::Doctor => {
            commands::doctor::run(engine.layout().root(), engine.config(), json_output)
        }
    };

    finish(result)
}

fn finish(result: Result<u8, String>) -> ExitCode {
    match result {
        Ok(code) => ExitCode::from(code),
        Err(msg) => exit_with(&msg),
    }
}

fn exit_with(msg: &str) -> ExitCode {
    eprintln!("error: {msg}");
    ExitCode::from(commands::exit_code_for(msg))
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(stripped);
        }
    }
    PathBuf::from(path)
}
