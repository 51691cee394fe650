use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{Router, routing::get};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use super::api::{self, AppState};
use super::bus::{self, EventBus};
use super::coordinator::{Coordinator, CoreSettings};
use super::db::{BoardDb, DbHandle};
use super::ws;

/// Configuration for the board server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub dev_mode: bool,
    pub core: CoreSettings,
    pub bus_capacity: usize,
    pub heartbeat: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3141,
            db_path: PathBuf::from(".corkboard/board.db"),
            dev_mode: false,
            core: CoreSettings::default(),
            bus_capacity: bus::DEFAULT_CAPACITY,
            heartbeat: bus::HEARTBEAT_INTERVAL,
        }
    }
}

/// Build the full application router: JSON API plus the observer socket.
pub fn build_router(state: Arc<AppState>) -> Router {
    api::api_router()
        .route("/api/boards/{id}/ws", get(ws::ws_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Open (or create) the database file, creating its directory first.
pub fn open_database(path: &std::path::Path) -> Result<BoardDb> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).context("Failed to create database directory")?;
    }
    BoardDb::new(path).context("Failed to initialize board database")
}

/// Start the board server and run until Ctrl+C.
pub async fn start_server(config: ServerConfig) -> Result<()> {
    let db = open_database(&config.db_path)?;
    let bus = EventBus::new(config.bus_capacity, config.heartbeat);
    let coordinator = Coordinator::new(DbHandle::new(db), bus.clone(), config.core);
    let state = Arc::new(AppState { coordinator });

    let mut app = build_router(state);
    if config.dev_mode {
        app = app.layer(CorsLayer::permissive());
    }

    let host = if config.dev_mode {
        "0.0.0.0"
    } else {
        config.host.as_str()
    };
    let addr = format!("{}:{}", host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    let local_addr = listener.local_addr()?;
    info!(
        addr = %local_addr,
        db = %config.db_path.display(),
        "Corkboard running at http://{}",
        local_addr
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(bus))
        .await
        .context("Server error")?;

    info!("Server shut down gracefully");
    Ok(())
}

/// Wait for Ctrl+C, then close every observer feed so open sockets finish.
async fn shutdown_signal(bus: EventBus) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    info!("Shutting down...");
    bus.shutdown();
}
