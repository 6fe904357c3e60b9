mod cleanup;
mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::trace::TraceLayer;
use tracing::info;

use parlor_api::state::{AppState, AppStateInner};
use parlor_api::trivia::OpenTdb;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parlor=debug,parlor_api=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    let db = parlor_db::Database::open(&config.db_path)?;
    let trivia = OpenTdb::new(config.trivia_url.clone(), config.trivia_timeout)?;

    let state: AppState = Arc::new(AppStateInner {
        db,
        trivia: Arc::new(trivia),
        settings: config.settings()?,
    });

    // Hourly sweep of expired sessions
    tokio::spawn(cleanup::run_session_cleanup_loop(state.clone(), 3600));

    let app = parlor_api::router(state).layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Parlor listening on {} ({} mode)", addr, config.mode);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                tracing::warn!("Could not install SIGTERM handler: {}", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
