//! `agentry server` — Start the registry HTTP server.

use agentry_core::monitor::MonitorConfig;
use agentry_server::ServerConfig;

pub async fn run(
    host: String,
    port: u16,
    db_path: String,
    sweep_interval: u64,
    heartbeat_timeout: i64,
    purge_timeout: i64,
) -> Result<(), String> {
    let config = ServerConfig {
        host: host.clone(),
        port,
        db_path,
        monitor: MonitorConfig {
            sweep_interval_seconds: sweep_interval,
            heartbeat_timeout_seconds: heartbeat_timeout,
            purge_timeout_seconds: purge_timeout,
        },
    };

    println!("Starting agentry registry on {}:{}...", host, port);

    let server = agentry_server::start_server(config).await?;
    println!("Registry listening on http://{}", server.addr);

    // Keep the process running until interrupted
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| format!("Failed to listen for Ctrl+C: {}", e))?;

    println!("\nShutting down...");
    server.shutdown().await;
    Ok(())
}
