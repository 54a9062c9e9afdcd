use std::path::Path;
use std::sync::Arc;
use anyhow::{Result, Context};
use tokio::process::Command;
use tracing::{info, warn, error, debug};

use crate::config::env_config::EnvConfig;
use crate::discovery::{
    DiscoveryError, DiscoverySettings, DnsServiceResolver, EndpointDiscovery, GrpcProber,
};
use crate::grpc::RelayClient;

const CONFIG_FILE: &str = "config.yml";

pub async fn run(config: EnvConfig) -> Result<()> {
    info!("Starting Nerf in client mode");

    let settings = config.client
        .clone()
        .context("Client settings must be set in client mode")?;

    let resolver = Arc::new(DnsServiceResolver::new(settings.dns_server, settings.dns_timeout));
    let prober = Arc::new(GrpcProber::new(
        config.control_port,
        settings.probe_timeout,
        settings.login.clone(),
    ));
    let mut discovery_settings = DiscoverySettings::new(settings.dns_zone.clone());
    discovery_settings.deadline = settings.discovery_deadline;

    let discovery = EndpointDiscovery::new(resolver, prober, discovery_settings);
    let endpoint = match discovery.fastest().await {
        Ok(endpoint) => endpoint,
        Err(e @ DiscoveryError::NoEndpoints { .. }) => {
            error!("Relay discovery failed: {}", e);
            return Err(e).context("No relay endpoints are published for this deployment");
        }
        Err(e @ DiscoveryError::NoneReachable { .. }) => {
            error!("Relay discovery failed: {}", e);
            return Err(e).context("Relay endpoints exist but none answered");
        }
    };

    info!(
        "Using relay {} ({}, {}) at {}",
        endpoint.remote_host, endpoint.remote_ip, endpoint.description, endpoint.latency
    );

    let mut relay = RelayClient::connect(
        &endpoint.remote_host,
        config.control_port,
        settings.rpc_timeout,
    )
    .await?;

    let response = relay
        .request_config(&settings.login, &settings.token)
        .await
        .context("Failed to obtain an overlay config")?;

    info!(
        "Connected as {} via lighthouse {} (teams: {})",
        response.client_ip,
        response.lighthouse_ip,
        response.teams.join(", ")
    );

    let config_path = write_config(&settings.nebula_dir, &response.config).await?;

    let mut daemon = Command::new(&settings.nebula_bin)
        .arg("-config")
        .arg(&config_path)
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("Failed to start {}", settings.nebula_bin.display()))?;

    info!("Overlay daemon started (pid: {:?})", daemon.id());

    tokio::select! {
        status = daemon.wait() => {
            match status {
                Ok(status) => warn!("Overlay daemon exited: {}", status),
                Err(e) => error!("Failed to wait for overlay daemon: {}", e),
            }
        }
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutdown signal received");
        }
    }

    if let Err(e) = relay.disconnect(&settings.login).await {
        warn!("{:#}", e);
    }

    if let Err(e) = daemon.kill().await {
        debug!("Overlay daemon already stopped: {}", e);
    }

    Ok(())
}

/// Writes the overlay config into `dir`, creating it if needed
pub async fn write_config(dir: &Path, config: &str) -> Result<std::path::PathBuf> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("Failed to create {}", dir.display()))?;

    let path = dir.join(CONFIG_FILE);
    tokio::fs::write(&path, config)
        .await
        .with_context(|| format!("Failed to write overlay config to {}", path.display()))?;

    debug!("Overlay config written to {}", path.display());
    Ok(path)
}
