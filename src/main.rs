//! taxiid - TAXII 1.0/1.1 server
//!
//! Serves discovery, inbox, poll and collection management services over HTTP.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use taxii_server::{hash_secret, init_logging, Config, Server};

#[derive(Parser)]
#[command(name = "taxiid")]
#[command(about = "TAXII 1.0/1.1 server")]
#[command(version)]
struct Cli {
    /// Configuration file (YAML)
    #[arg(short, long, env = "TAXII_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the server (default)
    Serve,

    /// Print the SHA-256 hash of a password for use as `password_hash`
    HashPassword {
        /// Password to hash
        password: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::HashPassword { password } => {
            println!("{}", hash_secret(&password));
            Ok(())
        }
        Commands::Serve => serve(cli.config).await,
    }
}

async fn serve(config_path: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load(config_path.as_deref())?;
    init_logging(&config.logging).map_err(|e| e as Box<dyn std::error::Error>)?;

    tracing::info!("Starting taxiid");
    match config_path {
        Some(ref path) => tracing::info!("  Config: {}", path.display()),
        None => tracing::info!("  Config: defaults"),
    }
    tracing::info!("  Bind address: {}", config.network.bind_addr);
    tracing::info!(
        "  Domain: {}",
        config.network.domain.as_deref().unwrap_or("<none>")
    );
    tracing::info!(
        "  Protocol versions: {}",
        config
            .protocol
            .versions
            .iter()
            .map(|v| v.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );
    tracing::info!(
        "  XML validation: {}",
        if config.protocol.xml_validation {
            "enabled"
        } else {
            "disabled"
        }
    );
    tracing::info!(
        "  Metrics: {}",
        if config.metrics.enabled {
            "enabled (/management/metrics)"
        } else {
            "disabled"
        }
    );
    if let Some(ref path) = config.storage.snapshot_path {
        tracing::info!("  Snapshot: {}", path.display());
    }

    let server = Arc::new(Server::from_config(&config)?);

    // Spawn shutdown signal handler
    let shutdown_server = server.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Received shutdown signal, stopping server...");
        shutdown_server.shutdown();
    });

    // Run server (blocks until shutdown)
    server.run().await?;

    if let Err(e) = server.save_snapshot() {
        tracing::error!("Failed to save snapshot on shutdown: {}", e);
    }

    tracing::info!("Server stopped");
    Ok(())
}
