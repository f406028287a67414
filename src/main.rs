// src/main.rs
use anyhow::Result;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

use tcp_balancer::config;
use tcp_balancer::server::Balancer;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("tcp_balancer=debug".parse()?)
                .add_directive("hyper=info".parse()?),
        )
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.yaml".to_string());

    info!("Loading configuration from: {}", config_path);
    let config = config::load_config(&config_path).await?;

    let drain_timeout = config.shutdown.drain_timeout();
    let abort_on_drain_timeout = config.shutdown.abort_on_drain_timeout;

    let balancer = Arc::new(Balancer::bind(config).await?);

    let server = {
        let balancer = balancer.clone();
        tokio::spawn(async move { balancer.serve().await })
    };

    shutdown_signal().await;

    match balancer.shutdown(drain_timeout).await {
        Ok(()) => info!("shutdown complete"),
        Err(e) => {
            warn!(error = %e, "graceful drain failed");
            if abort_on_drain_timeout {
                balancer.abort_sessions();
            }
        }
    }

    if let Err(e) = server.await? {
        error!(error = %e, "server task failed");
    }

    Ok(())
}

// Graceful shutdown handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
