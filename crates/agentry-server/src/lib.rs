//! Agentry Server — HTTP surface of the agent registry.
//!
//! A standalone axum backend exposing the `/registry/agents` API:
//! registration, heartbeats, discovery, and instance lifecycle, backed by
//! the agentry-core store and swept by the heartbeat monitor. This crate
//! can be used standalone or embedded in other applications.

pub mod api;
pub mod correlation;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use agentry_core::monitor::{HeartbeatMonitor, MonitorConfig, MonitorHandle};
use agentry_core::state::{AppState, AppStateInner};
use agentry_core::Database;

/// Configuration for the registry server.
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub db_path: String,
    /// Sweep cadence and expiry thresholds for the heartbeat monitor.
    pub monitor: MonitorConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            db_path: "agentry.db".to_string(),
            monitor: MonitorConfig::default(),
        }
    }
}

/// A started server: the bound address plus the sweep task's lifecycle
/// handle.
pub struct RunningServer {
    pub addr: SocketAddr,
    pub monitor: MonitorHandle,
}

impl RunningServer {
    /// Stop the background sweep cleanly. The HTTP task ends with the
    /// runtime.
    pub async fn shutdown(self) {
        self.monitor.shutdown().await;
    }
}

/// Create a shared `AppState` from a database path.
///
/// This is useful when you need to share the state between the HTTP server
/// and other consumers (e.g. tests driving the store directly).
pub async fn create_app_state(db_path: &str) -> Result<AppState, String> {
    let db = Database::open(db_path).map_err(|e| format!("Failed to open database: {}", e))?;
    Ok(Arc::new(AppStateInner::new(db)))
}

/// Build the registry router with correlation, CORS, and trace layers
/// applied.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(api::api_router())
        .route("/health", axum::routing::get(health_check))
        .layer(axum::middleware::from_fn(correlation::propagate))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the registry server, including the heartbeat monitor sweep.
///
/// Returns the bound address and the monitor handle.
pub async fn start_server(config: ServerConfig) -> Result<RunningServer, String> {
    // Initialize tracing; the embedding binary may have installed a
    // subscriber already.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "agentry_server=info,tower_http=info".into()),
        )
        .try_init();

    tracing::info!(
        "Starting agentry registry on {}:{}",
        config.host,
        config.port
    );

    let state = create_app_state(&config.db_path).await?;
    start_server_with_state(config, state).await
}

/// Start the HTTP server with a pre-built `AppState`.
///
/// This variant is useful when you want to share the state with other
/// consumers (tests, embedding applications).
pub async fn start_server_with_state(
    config: ServerConfig,
    state: AppState,
) -> Result<RunningServer, String> {
    let monitor = HeartbeatMonitor::new(state.instances.clone(), config.monitor.clone()).spawn();

    let app = build_router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| format!("Invalid address: {}", e))?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| format!("Failed to bind to {}: {}", addr, e))?;

    let local_addr = listener
        .local_addr()
        .map_err(|e| format!("Failed to get local address: {}", e))?;

    tracing::info!("Agentry registry listening on {}", local_addr);

    // Spawn the server in a background task
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("Server error: {}", e);
        }
    });

    Ok(RunningServer {
        addr: local_addr,
        monitor,
    })
}

async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "ok",
        "server": "agentry-server",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
