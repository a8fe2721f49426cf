//! Puzzle Sync Server binary

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use puzzle_sync_server::auth::HmacTokenVerifier;
use puzzle_sync_server::config::{Config, StoreBackend};
use puzzle_sync_server::routes::build_router;
use puzzle_sync_server::state::AppState;
use puzzle_sync_server::store::{GameStore, MemoryGameStore, SqliteGameStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "puzzle_sync_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();

    let config = Config::from_env().context("Failed to load configuration")?;

    tracing::info!("Starting Puzzle Sync Server v{}", env!("CARGO_PKG_VERSION"));

    let store: Arc<dyn GameStore> = match config.database.backend {
        StoreBackend::Sqlite => {
            let store = SqliteGameStore::connect(&config.database.url)
                .await
                .context("Failed to initialize database")?;
            tracing::info!("Database initialized at {}", config.database.url);
            Arc::new(store)
        }
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store, games are lost on shutdown");
            Arc::new(MemoryGameStore::new())
        }
    };

    let verifier = HmacTokenVerifier::new(config.auth.secret.clone())
        .with_ttl(chrono::Duration::seconds(config.auth.token_ttl_secs));

    let host: std::net::IpAddr = config
        .server
        .host
        .parse()
        .with_context(|| format!("Invalid SERVER_HOST: {}", config.server.host))?;
    let addr = SocketAddr::new(host, config.server.port);

    let app = build_router(AppState::new(config, store, Arc::new(verifier)));

    // Start server with graceful shutdown
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("Puzzle Sync Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown...");
        },
    }
}
