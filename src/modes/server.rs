use std::sync::Arc;
use anyhow::{Result, Context};
use tonic::transport::Server;
use tracing::{info, error};

use crate::config::env_config::EnvConfig;
use crate::directory::{
    self, DirectoryCache, DirectorySyncer, GitHubDirectory, MembershipResolver, ReadinessLatch,
    SyncSettings,
};
use crate::grpc::{NerfService, OverlaySettings};
use crate::metrics;
use crate::nebula::NebulaCertIssuer;

pub async fn run(config: EnvConfig) -> Result<()> {
    info!("Starting Nerf in relay server mode");

    let settings = config.server
        .clone()
        .context("Server settings must be set in server mode")?;

    // Backdated, so the first tick rebuilds it
    let cache = Arc::new(DirectoryCache::new(chrono::Utc::now().timestamp()));
    let github = Arc::new(GitHubDirectory::new(
        settings.github_api_url.clone(),
        settings.github_token.clone(),
    ));
    let readiness = ReadinessLatch::new();

    let syncer = Arc::new(DirectorySyncer::new(
        github.clone(),
        Arc::clone(&cache),
        SyncSettings {
            organization: settings.organization.clone(),
            page_size: settings.directory_page_size,
            ttl: settings.cache_ttl,
        },
        readiness.clone(),
    ));

    let _sync_handle = directory::start_sync_task(Arc::clone(&syncer), settings.sync_interval);

    if let Some(metrics_addr) = settings.metrics_addr {
        tokio::spawn(async move {
            if let Err(e) = metrics::serve(metrics_addr).await {
                error!("Metrics endpoint error: {:#}", e);
            }
        });
    }

    // Config requests are only meaningful once teams are known
    info!("Waiting for the first directory sync of {}", settings.organization);
    readiness.wait().await;
    info!("Directory cache ready with {} teams", cache.team_count());

    let service = NerfService::new(
        MembershipResolver::new(Arc::clone(&cache)),
        github,
        Arc::new(NebulaCertIssuer::new(
            settings.nebula_cert_bin.clone(),
            settings.cert_dir.clone(),
            settings.cert_duration.clone(),
        )),
        OverlaySettings {
            lighthouse: settings.lighthouse,
            subnet: settings.nebula_subnet,
        },
    );

    info!("Relay RPC listening on {}", settings.listen_addr);
    Server::builder()
        .add_service(service.into_server())
        .serve_with_shutdown(settings.listen_addr, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutdown signal received");
        })
        .await
        .context("Relay RPC server failed")?;

    Ok(())
}
