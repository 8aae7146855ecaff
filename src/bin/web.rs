use anyhow::{Context, Result};
use clap::Parser;
use pickem::config::{init_logging, AppConfig};
use pickem::espn_api::EspnClient;
use pickem::server::{router, AppState};
use pickem::store::Store;
use std::sync::Arc;

/// Pick'em REST server
#[derive(Parser)]
#[command(version, about)]
struct Args {
    #[command(flatten)]
    config: AppConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables and initialize logging
    init_logging();

    let config = Args::parse().config;

    let store = Store::open(&config.data_file)
        .await
        .with_context(|| format!("Failed to open store at {}", config.data_file.display()))?;
    let provider = EspnClient::new(config.espn_base_url.clone(), config.fetch_timeout())
        .context("Failed to build ESPN client")?;

    if config.admin_token.is_none() {
        tracing::warn!("ADMIN_TOKEN not set, admin routes are open");
    }

    let state = AppState {
        store: Arc::new(store),
        provider: Arc::new(provider),
        lock_policy: config.lock_policy()?,
        reconcile_options: config.reconcile_options(),
        admin_token: config.admin_token.as_deref().map(Arc::from),
    };

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    tracing::info!("Starting web server at http://{}", config.bind_addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await
        .context("Server error")?;

    Ok(())
}
