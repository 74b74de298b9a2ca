//! Chatty Cache node
//!
//! Runs one replicated cache node behind a small HTTP API.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chatty_cache::api::{create_router, AppState};
use chatty_cache::relay::{BusRelay, Transport};
use chatty_cache::Config;

/// Main entry point for a cache node.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Connect the bus transport and start the replication relay
/// 4. Create the cache and register it with the relay
/// 5. Create Axum router with all endpoints
/// 6. Start HTTP server on configured port
/// 7. Handle graceful shutdown on SIGINT/SIGTERM
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chatty_cache=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Chatty Cache node");

    let config = Config::from_env();
    info!(
        "Configuration loaded: max_cache_size={}, port={}, subject={}, encrypted={}",
        config.max_cache_size,
        config.server_port,
        config.replicate_subject,
        config.encryption_enabled()
    );

    let transport = connect_transport(&config).await?;
    let relay = Arc::new(
        BusRelay::new(transport, config.replicate_subject.clone(), &config.passphrase)
            .context("Unable to start replication relay")?,
    );

    let state = AppState::replicated(config.max_cache_size, relay);
    info!("Cache initialized");

    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Unable to bind {}", addr))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

#[cfg(feature = "nats")]
async fn connect_transport(config: &Config) -> anyhow::Result<Arc<dyn Transport>> {
    let transport = chatty_cache::relay::NatsTransport::connect(&config.nats_url).await?;
    transport.subscribe_ready(&config.replicate_subject).await?;
    Ok(Arc::new(transport))
}

#[cfg(not(feature = "nats"))]
async fn connect_transport(config: &Config) -> anyhow::Result<Arc<dyn Transport>> {
    warn!(
        "Built without the `nats` feature; ignoring {} and replicating only within this process",
        config.nats_url
    );
    Ok(Arc::new(chatty_cache::relay::InMemoryBus::new()))
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }
}
