use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;

use origan_gateway::config::GatewayConfig;
use origan_gateway::{Gateway, serve_http, serve_https, sweeper};

#[derive(Parser, Debug)]
#[command(name = "origan-gateway", version, about = "Origan edge gateway")]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log filter when RUST_LOG is unset (e.g. "info" or
    /// "origan_gateway=debug").
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = GatewayConfig::load(cli.config.as_deref()).context("loading configuration")?;

    let log_level = cli.log_level.clone().unwrap_or_else(|| config.log_level.clone());
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "origan gateway starting");

    let http_listener = TcpListener::bind(config.http_addr())
        .await
        .with_context(|| format!("binding http port {}", config.http_port))?;
    let https_listener = TcpListener::bind(config.https_addr())
        .await
        .with_context(|| format!("binding https port {}", config.https_port))?;

    let gateway = Arc::new(Gateway::from_config(config)?);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let http = tokio::spawn(serve_http(
        Arc::clone(&gateway),
        http_listener,
        shutdown_rx.clone(),
    ));
    let https = tokio::spawn(serve_https(
        Arc::clone(&gateway),
        https_listener,
        shutdown_rx.clone(),
    ));
    let sweep = tokio::spawn(sweeper::run(Arc::clone(&gateway), shutdown_rx));

    wait_for_shutdown().await;
    info!("shutdown signal received, draining");
    let _ = shutdown_tx.send(true);

    let (http, https, _) = tokio::join!(http, https, sweep);
    http??;
    https??;
    info!("gateway stopped");
    Ok(())
}

/// Completes on SIGINT or SIGTERM.
async fn wait_for_shutdown() {
    use tokio::signal;

    let ctrl_c = signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("installing SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }
}
