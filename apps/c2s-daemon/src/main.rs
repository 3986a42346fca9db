mod config;

use std::path::PathBuf;
use std::sync::Arc;

use c2s_core::{Mapping, ServiceMapper};
use c2s_registry::ConsulClient;
use c2s_runtime::{bridge_gateway, ContainerRuntime, DockerRuntime};
use c2s_sync::SyncService;
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::config::DaemonConfig;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(long, short)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile, then follow container events (default)
    Run,
    /// Run one reconciliation pass and exit
    Reconcile,
    /// Print the registry mapping of one container as JSON
    Inspect { container: String },
}

#[tokio::main]
async fn main() {
    let filter = std::env::var("C2S_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();

    let config = match DaemonConfig::new(cli.config) {
        Ok(cfg) => cfg,
        Err(err) => {
            error!("failed to load config: {err}");
            std::process::exit(1);
        }
    };

    let runtime = match DockerRuntime::connect(&config.docker()) {
        Ok(runtime) => Arc::new(runtime),
        Err(err) => {
            error!("docker client setup failed: {err}");
            std::process::exit(1);
        }
    };

    if let Some(Commands::Inspect { container }) = &cli.command {
        std::process::exit(inspect(&config, runtime.as_ref(), container).await);
    }

    let registry = match ConsulClient::new(config.consul()) {
        Ok(client) => Arc::new(client),
        Err(err) => {
            error!("consul client setup failed: {err}");
            std::process::exit(1);
        }
    };
    info!(
        consul = %registry.base_url(),
        docker = %config.docker_socket_path,
        "container sync starting"
    );

    let mut service = SyncService::new(registry, runtime, config.sync());

    if let Some(Commands::Reconcile) = &cli.command {
        match service.reconcile_once().await {
            Ok(report) if report.is_clean() => std::process::exit(0),
            Ok(report) => {
                for (container, err) in &report.failed {
                    error!("{container}: {err}");
                }
                std::process::exit(1);
            }
            Err(err) => {
                error!("reconciliation failed: {err}");
                std::process::exit(1);
            }
        }
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    if let Err(err) = service.run(shutdown_rx).await {
        error!("container sync stopped: {err}");
        std::process::exit(1);
    }
}

async fn inspect(config: &DaemonConfig, runtime: &DockerRuntime, container: &str) -> i32 {
    let snapshot = match runtime.inspect(container).await {
        Ok(snapshot) => snapshot,
        Err(err) if err.is_not_found() => {
            error!("no such container: {container}");
            return 3;
        }
        Err(err) => {
            error!("inspect failed: {err}");
            return 1;
        }
    };

    let gateway = match runtime.list_networks().await {
        Ok(networks) => bridge_gateway(&networks, &config.bridge_network)
            .unwrap_or_else(|| config.default_gateway.clone()),
        Err(err) => {
            warn!("network lookup failed, using default gateway: {err}");
            config.default_gateway.clone()
        }
    };

    let mapper = ServiceMapper::new(config.sync().layout);
    let rendered = match mapper.map(&snapshot, &gateway) {
        Ok(Mapping::Register(mapped)) => serde_json::to_string_pretty(&mapped),
        Ok(Mapping::Skip { name }) => {
            serde_json::to_string_pretty(&serde_json::json!({ "name": name, "skip": true }))
        }
        Err(err) => {
            error!("{err}");
            return 1;
        }
    };
    match rendered {
        Ok(json) => {
            println!("{json}");
            0
        }
        Err(err) => {
            error!("encoding mapping failed: {err}");
            1
        }
    }
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(err) => {
                warn!("SIGTERM handler unavailable: {err}");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

#[cfg(test)]
mod tests {
    use super::{Cli, Commands};

    #[test]
    fn test_cli_parsing() {
        use clap::Parser;

        let cli = Cli::try_parse_from(["c2s-daemon"]).unwrap();
        assert!(cli.command.is_none());
        assert!(cli.config.is_none());

        let cli = Cli::try_parse_from(["c2s-daemon", "--config", "c2s.toml", "run"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Run)));
        assert_eq!(cli.config, Some(std::path::PathBuf::from("c2s.toml")));

        let cli = Cli::try_parse_from(["c2s-daemon", "reconcile"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Reconcile)));

        let cli = Cli::try_parse_from(["c2s-daemon", "inspect", "web"]).unwrap();
        match cli.command {
            Some(Commands::Inspect { ref container }) => assert_eq!(container, "web"),
            _ => panic!("expected Inspect command"),
        }

        assert!(Cli::try_parse_from(["c2s-daemon", "inspect"]).is_err());
    }
}
