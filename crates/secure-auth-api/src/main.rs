//! Secure Auth API Server

use anyhow::Context;
use secure_auth_api::{create_router, state::AppState};
use secure_auth_core::{
    AppConfig, InMemoryUserDirectory, LoggingConfig, MokaCache, PgUserDirectory, UserDirectory,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config()?;
    init_tracing(&config.logging);
    config.validate().context("invalid configuration")?;

    let directory: Arc<dyn UserDirectory> = match config.database.url {
        Some(_) => Arc::new(
            PgUserDirectory::connect_with_retry(&config.database)
                .await
                .context("user directory unavailable")?,
        ),
        None => {
            tracing::warn!("DATABASE_URL not set, users are kept in memory and lost on restart");
            Arc::new(InMemoryUserDirectory::new())
        }
    };
    let cache = Arc::new(MokaCache::new());

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let environment = config.server.environment;

    let state = Arc::new(AppState::new(config, directory, cache).context("invalid password parameters")?);
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(environment = ?environment, "Secure Auth API starting on http://{}", addr);
    tracing::info!("OpenAPI document at http://{}/api-docs/openapi.json", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Server stopped");
    Ok(())
}

/// `SECURE_AUTH_CONFIG` names an optional TOML file. Environment variables
/// override it.
fn load_config() -> anyhow::Result<AppConfig> {
    let config = match std::env::var("SECURE_AUTH_CONFIG") {
        Ok(path) => AppConfig::from_file(path)?.with_env_override()?,
        Err(_) => AppConfig::from_env()?,
    };
    Ok(config)
}

fn init_tracing(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("{},tower_http=debug,audit=info", config.level).into()
    });

    if config.json_format {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received");
}
