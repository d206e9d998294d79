//! Fleet Agent - Entry Point
//!
//! Executes jobs issued by the fleet control plane against the local
//! container engine.

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;

use fleetagent::app::options::{api_key_pair, AppOptions, LifecycleOptions};
use fleetagent::app::run::run;
use fleetagent::deploy::ExecutorSettings;
use fleetagent::host::RunMode;
use fleetagent::logs::{init_logging, LogOptions};
use fleetagent::storage::settings::{Settings, DEFAULT_SETTINGS_PATH};
use fleetagent::utils::BuildInfo;
use fleetagent::workers::poller;

use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    let mut cli_args: HashMap<String, String> = HashMap::new();

    for arg in args.iter().skip(1) {
        if let Some((key, value)) = arg.split_once('=') {
            // Handle --key=value format
            let clean_key = key.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), value.to_string());
        } else if arg.starts_with("--") {
            // Handle standalone flags like --version
            let clean_key = arg.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), "true".to_string());
        }
    }

    // Print version and exit
    let build = BuildInfo::current();
    if cli_args.contains_key("version") {
        match serde_json::to_string_pretty(&build) {
            Ok(json) => println!("{}", json),
            Err(_) => println!("{}", build),
        }
        return;
    }

    // Retrieve the settings file, defaults apply when the default file is absent
    let settings = match load_settings(cli_args.get("settings").map(PathBuf::from)).await {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Unable to read settings: {e:#}");
            return;
        }
    };

    // Initialize logging
    let log_options = LogOptions {
        log_level: settings.log_level.clone(),
        json_format: settings.log_json,
        log_dir: settings.log_dir.clone(),
        ..Default::default()
    };
    let _log_guard = match init_logging(log_options) {
        Ok(guard) => guard,
        Err(e) => {
            println!("Failed to initialize logging: {e}");
            None
        }
    };

    let run_mode = match cli_args.get("run-mode").map(|m| m.parse::<RunMode>()) {
        Some(Ok(mode)) => Some(mode),
        Some(Err(e)) => {
            error!("{}", e);
            return;
        }
        None => settings.run_mode,
    };

    if settings.agent_id.is_empty() {
        warn!("No agent_id configured, the poller will not match any job");
    }

    // Run the agent
    let options = AppOptions {
        lifecycle: LifecycleOptions {
            max_shutdown_delay: Duration::from_secs(settings.max_shutdown_delay_secs),
        },
        backend_base_url: settings.backend.base_url.clone(),
        request_timeout: Duration::from_secs(settings.backend.request_timeout_secs),
        api_key: api_key_pair(&settings.backend.api_key, settings.backend.api_secret.clone()),
        engine_socket: settings.engine.socket_path.clone(),
        run_mode,
        job_queue_capacity: settings.job_queue_capacity,
        enable_poller: settings.enable_poller,
        poller: poller::Options {
            agent_id: settings.agent_id.clone(),
            interval: Duration::from_secs(settings.polling_interval_secs),
            ..Default::default()
        },
        executor: ExecutorSettings {
            staging_root: settings.staging_dir.clone(),
            command_timeout: Duration::from_secs(settings.command_timeout_secs),
            stack_remove_timeout: Duration::from_secs(settings.stack_remove_timeout_secs),
            ..Default::default()
        },
    };

    info!("Running fleet agent with options: {:?}", options);
    let result = run(build.version.to_string(), options, await_shutdown_signal()).await;
    if let Err(e) = result {
        error!("Failed to run the agent: {e}");
    }
}

async fn load_settings(path: Option<PathBuf>) -> anyhow::Result<Settings> {
    let path = match path {
        Some(path) => path,
        None => {
            let path = PathBuf::from(DEFAULT_SETTINGS_PATH);
            if !path.exists() {
                return Ok(Settings::default());
            }
            path
        }
    };

    Settings::load(&path)
        .await
        .with_context(|| format!("loading {}", path.display()))
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let (mut sigterm, mut sigint) =
            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
                _ => {
                    warn!("Unable to install signal handlers, falling back to Ctrl+C");
                    let _ = tokio::signal::ctrl_c().await;
                    return;
                }
            };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down...");
            }
            _ = sigint.recv() => {
                info!("SIGINT received, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
        }
        info!("Ctrl+C received, shutting down...");
    }
}
