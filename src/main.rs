use std::net::SocketAddr;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sentinel_chain::api::{build_router, AppState};
use sentinel_chain::chain::{ChainLog, ChainStore};
use sentinel_chain::config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sentinel_chain=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Zero-Day Sentinel chain service");

    let config = AppConfig::load()?;

    // Load or create the chain
    let store = ChainStore::new(&config.chain_file, config.store_options());
    let chain = if config.reset_on_start {
        ChainLog::open_fresh(store)?
    } else {
        ChainLog::open(store)?
    };
    info!("Chain ready with {} entries", chain.len().await);

    let app = build_router(AppState::new(chain), &config.allowed_origins);

    let addr: SocketAddr = config.bind_address().parse()?;
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
