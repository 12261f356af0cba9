//! Flux HTTP load balancer - main entry point

use std::sync::Arc;

use clap::Parser;
use log::{error, info};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use flux_config::validator::validate as validate_config;
use flux_edge::LoadBalancer;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(short, long, default_value = "./config/config.yaml")]
    config: String,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Read configuration file
    let config = match flux_config::loader::read_config(&cli.config) {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("Error loading config: {}", err);
            std::process::exit(1);
        }
    };

    // Initialize the Logger
    flux_utils::logger::init_logger(&config.log.level, config.log.file.as_deref());

    // Validate Configurations
    if !validate_config(&config) {
        error!("Configuration validation failed. Exiting...");
        std::process::exit(1);
    }

    info!(
        "Flux starting with {} backends on port {}",
        config.backends.len(),
        config.listen.port
    );

    let lb = match LoadBalancer::new(&config) {
        Ok(lb) => Arc::new(lb),
        Err(err) => {
            error!("Failed to create load balancer: {}", err);
            std::process::exit(1);
        }
    };

    let cancel = CancellationToken::new();
    let monitor = match lb.start(cancel.clone()) {
        Ok(handle) => handle,
        Err(err) => {
            error!("Failed to start health monitor: {}", err);
            std::process::exit(1);
        }
    };

    let address = format!("{}:{}", config.listen.address, config.listen.port);
    let listener = match TcpListener::bind(&address).await {
        Ok(listener) => listener,
        Err(err) => {
            error!("Failed to bind {}: {}", address, err);
            std::process::exit(1);
        }
    };

    let server = tokio::spawn(flux_edge::server::serve(listener, lb, cancel.clone()));

    shutdown_signal().await;
    info!("Shutdown signal received");
    cancel.cancel();

    if let Err(err) = monitor.await {
        error!("Health monitor task failed: {}", err);
    }
    match server.await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => error!("Listener failed: {}", err),
        Err(err) => error!("Listener task failed: {}", err),
    }

    info!("Flux stopped");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                error!("Failed to listen for SIGTERM: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
