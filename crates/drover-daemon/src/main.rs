//! Drover Daemon - Leader-elected scheduler service
//!
//! The daemon runs one scheduler instance with in-process collaborators:
//! - Local cluster driver
//! - In-memory application repository and coordination backend
//! - Development command processor applying commands to the repository

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod dev;
mod error;
mod server;

use config::DaemonConfig;
use error::DaemonResult;
use server::Server;

/// Drover Daemon CLI
#[derive(Parser)]
#[command(name = "droverd")]
#[command(about = "Drover Daemon - Leader-elected scheduler service", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "DROVER_CONFIG")]
    config: Option<String>,

    /// Hostname advertised to the other candidates
    #[arg(long, env = "DROVER_HOSTNAME")]
    hostname: Option<String>,

    /// Log level
    #[arg(long, env = "DROVER_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "DROVER_LOG_JSON")]
    json: bool,

    /// Elect this instance directly instead of through the coordination backend
    #[arg(long)]
    single_instance: bool,
}

#[tokio::main]
async fn main() -> DaemonResult<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = DaemonConfig::load(cli.config.as_deref())?;

    // Override with CLI args
    if let Some(hostname) = cli.hostname {
        config.scheduler.hostname = hostname;
    }
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    if cli.json {
        config.logging.json = true;
    }
    if cli.single_instance {
        config.scheduler.ha = false;
    }

    // Initialize tracing
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.logging.level.clone().into());

    if config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        hostname = %config.scheduler.hostname,
        "Starting droverd"
    );

    let server = Server::new(config)?;
    server.run(server::shutdown_signal()).await
}
