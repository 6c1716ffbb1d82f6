//! schemaforge - MySQL schema diff, migration synthesis and sandbox validation
//!
//! This is the main entry point for the service.
//!
//! Register two MySQL environments (the intended "source" state and the
//! deployed "target" state), then diff them, generate an idempotent migration
//! script, and replay it inside an ephemeral MySQL container to verify the
//! schemas converge before anything touches production.

mod config;
mod connection;
mod diff;
mod error;
mod extractor;
mod handlers;
mod pipeline;
mod routes;
mod sandbox;
mod sqlgen;
mod state;

use crate::config::Settings;
use crate::routes::create_router;
use crate::state::AppState;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    info!("🚀 Starting schemaforge...");

    let settings = Settings::load()?;
    info!("📋 Configuration loaded successfully");

    let state = Arc::new(AppState::new(settings.clone()));
    let app = create_router(state, &settings);

    let addr = SocketAddr::from((settings.server.host, settings.server.port));

    info!("🌐 Server listening on http://{}", addr);
    info!("");
    info!("📚 API Endpoints:");
    info!("   POST /api/connections             - Register a MySQL environment");
    info!("   POST /api/diff                    - Diff two environments");
    info!("   POST /api/migration/generate      - Generate a migration script");
    info!("   POST /api/migration/validate      - Replay the script in a sandbox");
    info!("");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("👋 Server shutdown complete");
    Ok(())
}

/// Initialize tracing with structured logging
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,schemaforge=debug,tower_http=debug"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .compact(),
        )
        .init();
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("📴 Received Ctrl+C signal, initiating graceful shutdown...");
        },
        _ = terminate => {
            info!("📴 Received terminate signal, initiating graceful shutdown...");
        },
    }
}
