//! Faucet Relayer - issues faucet transfers for an external dispatcher
//!
//! Boots the transaction core against the configured endpoint and serves the
//! dispatcher API and Prometheus metrics.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info};

use faucet_relayer::api;
use faucet_relayer::chain::ChainProvider;
use faucet_relayer::config::Settings;
use faucet_relayer::metrics::MetricsServer;
use faucet_relayer::tx::{detector_for, TransactionSender};
use faucet_relayer::wallet;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    init_logging();

    info!("Starting Faucet Relayer v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let settings = Settings::load()?;
    info!(
        "Loaded configuration with {} RPC endpoint(s)",
        settings.chain.rpc_urls.len()
    );

    let wallet = wallet::load_wallet(&settings.wallet).context("Failed to load wallet")?;

    let provider = ChainProvider::new(
        &settings.chain.rpc_urls,
        Duration::from_secs(settings.chain.request_timeout_secs),
    )
    .context("Cannot connect to RPC provider")?;

    // Construction errors are fatal: bad endpoint, unknown nonce
    let detector = detector_for(settings.chain.fee_scheme);
    let sender = Arc::new(
        TransactionSender::new(
            Arc::new(provider),
            wallet,
            settings.chain.transfer_config()?,
            detector.as_ref(),
        )
        .await
        .context("Failed to initialize transaction sender")?,
    );

    // Start API server
    let api_handle = tokio::spawn({
        let config = settings.api.clone();
        let sender = sender.clone();
        async move {
            if let Err(e) = api::run_server(config, sender).await {
                error!("API server error: {}", e);
            }
        }
    });

    // Start metrics server
    let metrics_handle = if settings.metrics.enabled {
        let server = MetricsServer::new(settings.metrics.port);
        Some(tokio::spawn(async move {
            if let Err(e) = server.run().await {
                error!("Metrics server error: {}", e);
            }
        }))
    } else {
        None
    };

    info!("Faucet Relayer is running");
    info!("API server: http://{}:{}", settings.api.host, settings.api.port);
    if settings.metrics.enabled {
        info!("Metrics: http://0.0.0.0:{}/metrics", settings.metrics.port);
    }

    // Wait for shutdown signal
    shutdown_signal().await;

    info!("Shutdown signal received, stopping...");

    api_handle.abort();
    if let Some(h) = metrics_handle {
        h.abort();
    }

    info!("Faucet Relayer stopped");
    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,faucet_relayer=debug,hyper=warn"));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json().with_target(true)).init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .init();
    }
}

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
}
