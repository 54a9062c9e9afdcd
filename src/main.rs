use std::env;
use std::process::exit;
use clap::{Parser, Subcommand};
use tracing::{error, info};

use nerf::config::env_config::EnvConfig;
use nerf::modes::{self, OperationMode};

/// Mesh VPN onboarding: relay server and client
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve team-scoped overlay configs
    Server {
        /// Lighthouse as <NebulaIP>:<PublicIP>
        #[arg(long, env = "NERF_LIGHTHOUSE")]
        lighthouse: Option<String>,
    },
    /// Discover the fastest relay and join the overlay
    Client,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let (mode, lighthouse) = match cli.command {
        Command::Server { lighthouse } => (OperationMode::Server, lighthouse),
        Command::Client => (OperationMode::Client, None),
    };

    // Load environment configuration
    let loaded = match lighthouse {
        Some(lighthouse) => EnvConfig::from_lookup(mode, |key| match key {
            "NERF_LIGHTHOUSE" => Some(lighthouse.clone()),
            _ => env::var(key).ok(),
        }),
        None => EnvConfig::from_env(mode),
    };

    let env_config = match loaded {
        Ok(config) => config,
        Err(e) => {
            // Logging is not up yet
            eprintln!("Failed to load environment configuration: {}", e);
            exit(1);
        }
    };

    initialize_logging(&env_config.log_level);

    info!("Starting Nerf v{}", env!("CARGO_PKG_VERSION"));
    info!("Operation mode: {}", env_config.mode);

    let result = match env_config.mode {
        OperationMode::Server => modes::server::run(env_config).await,
        OperationMode::Client => modes::client::run(env_config).await,
    };

    if let Err(e) = result {
        error!("Nerf operation failed: {:#}", e);
        exit(1);
    }

    info!("Nerf shut down successfully");
}

fn initialize_logging(log_level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| {
            tracing_subscriber::EnvFilter::new(format!("nerf={}", log_level))
        });

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .init();
}
