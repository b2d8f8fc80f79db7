//! Dockyard - Entry Point
//!
//! Deploys, scales and rolls back containerised applications on a single host.
//!
//! ```text
//! dockyard deploy --app=api --tag=v2 [--release-dir=PATH] [--env-file=PATH]
//!                 [--health-timeout=SECS] [--network=MODE] [--ports=H:I,...]
//!                 [--volumes=SRC:DST,...] [--no-zero-downtime] [--keep-previous]
//! dockyard recreate --app=api [--release-dir=PATH] [--env-file=PATH]
//! dockyard scale --app=api web=4 worker=2
//! dockyard rollback --app=api
//! dockyard releases --app=api
//! dockyard ps:start|ps:stop|ps:restart --app=api [--process=web]
//! dockyard ps:status --app=api
//! dockyard --version
//! ```

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;

use colored::Colorize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use dockyard::app::options::PlatformOptions;
use dockyard::app::state::Platform;
use dockyard::deploy::config::DeploymentConfig;
use dockyard::deploy::releases::{list_releases, CURRENT_RELEASE_LINK};
use dockyard::errors::DockyardError;
use dockyard::logs::{init_logging, LogOptions};
use dockyard::process::ActionReport;
use dockyard::runtime::NetworkMode;
use dockyard::scale::parse_scale_argument;
use dockyard::storage::layout::StorageLayout;
use dockyard::storage::settings::Settings;
use dockyard::utils::version_info;

#[tokio::main]
async fn main() {
    // Parse command line arguments
    let mut cli_args: HashMap<String, String> = HashMap::new();
    let mut positional: Vec<String> = Vec::new();

    for arg in env::args().skip(1) {
        if let Some(flag) = arg.strip_prefix("--") {
            match flag.split_once('=') {
                // Handle --key=value format
                Some((key, value)) => cli_args.insert(key.to_string(), value.to_string()),
                // Handle standalone flags like --version
                None => cli_args.insert(flag.to_string(), "true".to_string()),
            };
        } else {
            positional.push(arg);
        }
    }

    // Print version and exit
    if cli_args.contains_key("version") {
        match serde_json::to_string_pretty(&version_info()) {
            Ok(version) => println!("{}", version),
            Err(e) => eprintln!("Failed to render version: {}", e),
        }
        return;
    }

    let Some(command) = positional.first().cloned() else {
        eprintln!("{}", "Usage: dockyard <command> --app=<name> [options]".yellow());
        eprintln!("Commands: deploy, recreate, scale, rollback, releases, ps:start, ps:stop, ps:restart, ps:status");
        std::process::exit(2);
    };

    // Retrieve the settings file
    let layout = StorageLayout::default();
    let settings = match Settings::load_or_default(&layout.settings_file()).await {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Unable to read settings file: {}", e);
            std::process::exit(1);
        }
    };

    // Initialize logging
    let log_dir = layout.logs_dir();
    let log_options = LogOptions {
        log_level: settings.log_level.clone(),
        json_format: settings.json_logs,
        log_dir: log_dir.exists().await.then(|| log_dir.path().to_path_buf()),
    };
    let _log_guard = match init_logging(log_options) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            None
        }
    };

    let options = PlatformOptions::from_settings(layout, &settings);
    let platform = match Platform::init(options).await {
        Ok(platform) => platform,
        Err(e) => {
            error!("Failed to initialize dockyard: {}", e);
            std::process::exit(1);
        }
    };

    // Cancel in-flight health waits on shutdown signals
    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        await_shutdown_signal().await;
        signal_cancel.cancel();
    });

    if let Err(e) = dispatch(&platform, &command, &positional[1..], &cli_args, &cancel).await {
        eprintln!("{} {}", "!".red().bold(), e);
        std::process::exit(1);
    }
}

async fn dispatch(
    platform: &Platform,
    command: &str,
    positional: &[String],
    cli_args: &HashMap<String, String>,
    cancel: &CancellationToken,
) -> Result<(), DockyardError> {
    let app_name = require(cli_args, "app")?;
    let process_type = cli_args.get("process").map(String::as_str);

    match command {
        "deploy" => {
            let config = deployment_config(platform, app_name, cli_args)?;
            info!("Deploying {} with image {}", app_name, config.image());
            let report = platform.deployer.deploy(&config, cancel).await?;
            println!("{} {} deployment complete", "=====>".bold(), report.strategy);
            println!("-----> Active container: {}", report.active);
            println!("-----> Running image: {}", report.image);
            if let Some(port) = report.container_port {
                println!("-----> Port: {}", port);
            }
        }
        "recreate" => {
            let layout = &platform.options.layout;
            let env_file = path_arg(cli_args, "env-file")
                .unwrap_or_else(|| layout.env_file(app_name).path().to_path_buf());
            let release_dir = path_arg(cli_args, "release-dir")
                .unwrap_or_else(|| layout.releases_dir(app_name).path().join(CURRENT_RELEASE_LINK));
            let report = platform
                .deployer
                .recreate_active(app_name, &env_file, &release_dir)
                .await?;
            println!("{} Container {} recreated from {}", "✓".green(), report.active, report.image);
        }
        "scale" => {
            if positional.is_empty() {
                return Err(DockyardError::InvalidScale(
                    "expected at least one process=count".to_string(),
                ));
            }
            let targets = positional
                .iter()
                .map(|arg| parse_scale_argument(arg))
                .collect::<Result<Vec<_>, _>>()?;
            for report in platform.scaler.scale_many(app_name, &targets).await? {
                println!(
                    "{} {} {}: {} -> {} (created {:?}, removed {:?})",
                    "-----> ".bold(),
                    report.app_name,
                    report.process_type,
                    report.previous,
                    report.target,
                    report.created,
                    report.removed
                );
                for failure in &report.failed {
                    println!(
                        "       {} ordinal {}: {}",
                        "failed".red(),
                        failure.ordinal,
                        failure.reason
                    );
                }
            }
        }
        "rollback" => {
            platform.rollback.rollback(app_name).await?;
            println!("{} Rollback of {} complete", "✓".green(), app_name);
        }
        "releases" => {
            let releases = list_releases(&platform.options.layout, app_name).await?;
            if releases.is_empty() {
                println!("No releases found");
            }
            for release in releases {
                let status = if release.current {
                    "current".green()
                } else {
                    "".normal()
                };
                println!("{:<32} {}", release.id, status);
            }
        }
        "ps:start" => print_action("start", platform.processes.start(app_name, process_type).await?),
        "ps:stop" => print_action("stop", platform.processes.stop(app_name, process_type).await?),
        "ps:restart" => {
            print_action("restart", platform.processes.restart(app_name, process_type).await?)
        }
        "ps:status" => {
            let statuses = platform.processes.status(app_name).await?;
            if statuses.is_empty() {
                println!("No processes recorded for app '{}'", app_name);
            }
            for status in statuses {
                let live = if status.running {
                    "running".green()
                } else {
                    "down".red()
                };
                println!(
                    "{:<24} {:<10} host:{:<6} internal:{:<6} recorded:{:<8} {}",
                    status.record.name,
                    status.record.process_type,
                    status.record.host_port,
                    status.record.internal_port,
                    status.record.status,
                    live
                );
            }
        }
        other => {
            return Err(DockyardError::ConfigError(format!("unknown command: {}", other)));
        }
    }
    Ok(())
}

fn deployment_config(
    platform: &Platform,
    app_name: &str,
    cli_args: &HashMap<String, String>,
) -> Result<DeploymentConfig, DockyardError> {
    let layout = &platform.options.layout;
    let tag = cli_args.get("tag").map(String::as_str).unwrap_or("latest");

    let env_file = path_arg(cli_args, "env-file")
        .unwrap_or_else(|| layout.env_file(app_name).path().to_path_buf());
    let release_dir = path_arg(cli_args, "release-dir")
        .unwrap_or_else(|| layout.releases_dir(app_name).path().join(tag));

    let mut config = DeploymentConfig::new(app_name, tag, env_file, release_dir);
    config.zero_downtime_requested = !cli_args.contains_key("no-zero-downtime");
    config.keep_previous = cli_args.contains_key("keep-previous");
    config.health_timeout_secs = match cli_args.get("health-timeout") {
        Some(secs) => secs.parse().map_err(|_| {
            DockyardError::ConfigError(format!("invalid --health-timeout: {}", secs))
        })?,
        None => platform.options.default_health_timeout.as_secs(),
    };
    if let Some(mode) = cli_args.get("network") {
        config.network_mode = Some(mode.parse::<NetworkMode>()?);
    }
    config.port_mappings = list_arg(cli_args, "ports");
    config.volume_mounts = list_arg(cli_args, "volumes");
    if let Some(port) = cli_args.get("default-port") {
        config.default_port = Some(port.parse().map_err(|_| {
            DockyardError::ConfigError(format!("invalid --default-port: {}", port))
        })?);
    }
    Ok(config)
}

fn require<'a>(cli_args: &'a HashMap<String, String>, key: &str) -> Result<&'a str, DockyardError> {
    cli_args
        .get(key)
        .map(String::as_str)
        .ok_or_else(|| DockyardError::ConfigError(format!("missing --{}=<value>", key)))
}

fn path_arg(cli_args: &HashMap<String, String>, key: &str) -> Option<PathBuf> {
    cli_args.get(key).map(PathBuf::from)
}

fn list_arg(cli_args: &HashMap<String, String>, key: &str) -> Vec<String> {
    cli_args
        .get(key)
        .map(|value| {
            value
                .split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn print_action(action: &str, report: ActionReport) {
    if report.discovered && !report.succeeded.is_empty() {
        println!("-----> No records found, used {} discovered container(s)", report.succeeded.len());
    }
    for name in &report.succeeded {
        println!("{} {} {}", "✓".green(), action, name);
    }
    for (name, reason) in &report.failed {
        println!("{} {} {}: {}", "✗".red(), action, name, reason);
    }
    if report.succeeded.is_empty() && report.failed.is_empty() {
        println!("No processes found");
    }
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
                info!("SIGTERM received, cancelling...");
            }
            _ = sigint.recv() => {
                info!("SIGINT received, cancelling...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl+C received, cancelling...");
        }
    }
}
