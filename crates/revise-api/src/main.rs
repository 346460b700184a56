mod ai;
mod auth;
mod config;
mod error;
mod rate_limit;
mod routes;
mod store;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use config::AppConfig;
use routes::{app_router, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    #[cfg(debug_assertions)]
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("revise_api=info".parse().expect("valid directive")),
        )
        .init();

    let config = Arc::new(AppConfig::from_env()?);
    tracing::info!(?config, "Starting revise-api");

    let state = AppState::from_config(config)?;
    let bind_addr = state.config.bind_addr.clone();
    tracing::info!(
        database = %state.config.database_path.display(),
        max_sync_batch = state.config.max_sync_batch,
        "Sync store ready"
    );

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("revise-api listening on {}", bind_addr);
    axum::serve(listener, app_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("revise-api stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {error}");
        std::future::pending::<()>().await;
    }
}
