//! Agentry CLI — command-line interface for the agent registry.
//!
//! Runs the registry server and drives a running registry from the
//! command line: register service instances, keep heartbeats alive,
//! discover by capability, and forward calls to named services.

mod commands;

use clap::{Parser, Subcommand};

/// Agentry CLI — agent registry and discovery service
#[derive(Parser)]
#[command(
    name = "agentry",
    version,
    about = "Agentry CLI — agent registry and discovery service"
)]
pub struct Cli {
    /// Registry base URL used by client commands
    #[arg(
        long,
        env = "AGENTRY_REGISTRY_URL",
        default_value = "http://127.0.0.1:8080",
        global = true
    )]
    registry: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the registry HTTP server
    Server {
        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        /// Port to listen on
        #[arg(long, default_value_t = 8080)]
        port: u16,
        /// Path to the SQLite database file
        #[arg(long, env = "AGENTRY_DB_PATH", default_value = "agentry.db")]
        db: String,
        /// Seconds between heartbeat monitor sweeps
        #[arg(long, default_value_t = 30)]
        sweep_interval: u64,
        /// Heartbeat silence (seconds) before an instance turns stale
        #[arg(long, default_value_t = 180)]
        heartbeat_timeout: i64,
        /// Age (seconds) after which stale/deregistered records are purged
        #[arg(long, default_value_t = 3600)]
        purge_timeout: i64,
    },

    /// Register a service instance and print its record
    Register {
        /// Service name
        #[arg(long)]
        name: String,
        /// Endpoint URL the service accepts calls on
        #[arg(long)]
        endpoint: String,
        /// Capability tag (repeatable)
        #[arg(long = "capability")]
        capabilities: Vec<String>,
        /// Metadata as a JSON object
        #[arg(long, default_value = "{}")]
        metadata: String,
    },

    /// Register and keep heartbeating until Ctrl+C, then deregister
    Run {
        /// Service name
        #[arg(long)]
        name: String,
        /// Endpoint URL the service accepts calls on
        #[arg(long)]
        endpoint: String,
        /// Capability tag (repeatable)
        #[arg(long = "capability")]
        capabilities: Vec<String>,
        /// Metadata as a JSON object
        #[arg(long, default_value = "{}")]
        metadata: String,
        /// Seconds between heartbeats
        #[arg(long, default_value_t = 60)]
        interval: u64,
    },

    /// Send a single heartbeat for a registered instance
    Heartbeat {
        /// Instance id
        #[arg(long)]
        id: String,
    },

    /// List registered instances
    List {
        /// Filter by capability tag
        #[arg(long)]
        capability: Option<String>,
        /// Filter by status: active, stale, or deregistered
        #[arg(long)]
        status: Option<String>,
    },

    /// Discover active instances by capability
    Discover {
        /// Capability tag to search for
        #[arg(long)]
        capability: String,
    },

    /// Resolve the endpoint behind a service name
    Resolve {
        /// Service name
        #[arg(long)]
        name: String,
    },

    /// Forward a call to a named service through the registry
    Call {
        /// Target service name
        #[arg(long)]
        service: String,
        /// Method (path) to invoke on the service
        #[arg(long)]
        method: String,
        /// JSON payload
        #[arg(long, default_value = "{}")]
        payload: String,
        /// Request timeout in seconds
        #[arg(long, default_value_t = 30)]
        timeout: u64,
    },

    /// Deregister an instance
    Deregister {
        /// Instance id
        #[arg(long)]
        id: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "agentry_core=warn,agentry_server=info,agentry_cli=info".into()),
        )
        .init();

    let result = match cli.command {
        Commands::Server {
            host,
            port,
            db,
            sweep_interval,
            heartbeat_timeout,
            purge_timeout,
        } => {
            commands::server::run(host, port, db, sweep_interval, heartbeat_timeout, purge_timeout)
                .await
        }

        Commands::Register {
            name,
            endpoint,
            capabilities,
            metadata,
        } => commands::service::register(&cli.registry, &name, &endpoint, capabilities, &metadata)
            .await,

        Commands::Run {
            name,
            endpoint,
            capabilities,
            metadata,
            interval,
        } => {
            commands::service::run(
                &cli.registry,
                &name,
                &endpoint,
                capabilities,
                &metadata,
                interval,
            )
            .await
        }

        Commands::Heartbeat { id } => commands::service::heartbeat(&cli.registry, &id).await,

        Commands::List { capability, status } => {
            commands::query::list(&cli.registry, capability.as_deref(), status.as_deref()).await
        }

        Commands::Discover { capability } => {
            commands::query::discover(&cli.registry, &capability).await
        }

        Commands::Resolve { name } => commands::query::resolve(&cli.registry, &name).await,

        Commands::Call {
            service,
            method,
            payload,
            timeout,
        } => commands::call::run(&cli.registry, &service, &method, &payload, timeout).await,

        Commands::Deregister { id } => commands::service::deregister(&cli.registry, &id).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
