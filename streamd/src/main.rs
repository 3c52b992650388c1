//! GitShip streamd - Entry Point
//!
//! Server half of the live build-log path: accepts log lines and status
//! updates from build executors and streams them to subscribed dashboards
//! over WebSocket.

use std::collections::HashMap;
use std::env;

use streamd::app::options::AppOptions;
use streamd::app::run::run;
use streamd::config::{load_settings, Settings};
use streamd::logs::{init_logging, LogOptions};
use streamd::utils::version_info;

use tracing::{error, info};

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
    let version = version_info();
    if cli_args.contains_key("version") {
        match serde_json::to_string_pretty(&version) {
            Ok(json) => println!("{}", json),
            Err(_) => println!("{}", version.version),
        }
        return;
    }

    // Load settings (optional config file, defaults otherwise)
    let mut settings = match cli_args.get("config") {
        Some(path) => match load_settings(path).await {
            Ok(settings) => settings,
            Err(e) => {
                eprintln!("Unable to read settings file {path}: {e}");
                return;
            }
        },
        None => Settings::default(),
    };

    // CLI overrides
    if let Some(host) = cli_args.get("host") {
        settings.server.host = host.clone();
    }
    if let Some(port) = cli_args.get("port") {
        match port.parse() {
            Ok(port) => settings.server.port = port,
            Err(_) => {
                eprintln!("Invalid port: {port}");
                return;
            }
        }
    }
    if let Some(level) = cli_args.get("log-level") {
        match level.parse() {
            Ok(level) => settings.log_level = level,
            Err(e) => {
                eprintln!("{e}");
                return;
            }
        }
    }

    // Initialize logging
    let log_options = LogOptions {
        log_level: settings.log_level.clone(),
        json_format: settings.log_json,
    };
    if let Err(e) = init_logging(log_options) {
        println!("Failed to initialize logging: {e}");
    }

    let options = AppOptions::from_settings(&settings);
    info!("Running GitShip streamd with options: {:?}", options);

    let result = run(version.version, options, await_shutdown_signal()).await;
    if let Err(e) = result {
        error!("Failed to run the service: {e}");
    }
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                error!("Failed to install SIGTERM handler: {e}");
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down...");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl+C received, shutting down...");
        }
    }
}
