//! kv_orm server
//!
//! Serves the `users` entity over HTTP, backed by SQLite and mirrored into
//! the in-process cache.

use std::net::SocketAddr;

use anyhow::Context;
use rusqlite::Connection;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use kv_orm::api::{create_router, AppState};
use kv_orm::model::User;
use kv_orm::{spawn_cleanup_task, Config};

/// Main entry point for the kv_orm server.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Open the primary store and ensure the schema exists
/// 4. Load the cache from the primary store
/// 5. Start background TTL cleanup task
/// 6. Start HTTP server on configured port
/// 7. Handle graceful shutdown on SIGINT/SIGTERM
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kv_orm=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting kv_orm server");

    let config = Config::from_env();
    info!(
        "Configuration loaded: database={}, port={}, cleanup_interval={}s, load_page_size={}, record_ttl={}s",
        config.database_path,
        config.server_port,
        config.cleanup_interval,
        config.load_page_size,
        config.record_ttl
    );

    let conn = Connection::open(&config.database_path)
        .with_context(|| format!("failed to open database {}", config.database_path))?;
    conn.execute_batch(User::CREATE_TABLE)
        .context("failed to create users table")?;
    info!("Primary store ready");

    let state = AppState::from_config(conn, &config);
    let report = state.load().await.context("initial cache load failed")?;
    info!(
        "Cache loaded: {} records in {} pages",
        report.records, report.pages
    );

    let cleanup_handle = spawn_cleanup_task(state.cache.clone(), config.cleanup_interval);
    info!("Background cleanup task started");

    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cleanup_handle))
        .await
        .context("server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
///
/// On shutdown signal, aborts the cleanup task and allows graceful shutdown.
async fn shutdown_signal(cleanup_handle: tokio::task::JoinHandle<()>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
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

    cleanup_handle.abort();
    warn!("Cleanup task aborted");
}
