// Relay discovery for Nerf
//
// Candidates come from `_vpn._udp.<zone>` SRV records; each is labelled from
// its TXT record, addressed from its A/AAAA records and probed over the
// control port. The fastest reachable relay wins.

pub mod endpoint;
pub mod prober;
pub mod resolver;

pub use endpoint::{Endpoint, Latency, ProbeFailure};
pub use prober::{GrpcProber, Prober};
pub use resolver::{DnsServiceResolver, ServiceResolver, SrvTarget};

use std::sync::Arc;
use std::time::Duration;
use futures::future::join_all;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::metrics;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryError {
    /// `skipped` counts SRV targets dropped for failed TXT or address lookups
    #[error("no available relay endpoints found for {srv_name} ({skipped} SRV targets unresolvable)")]
    NoEndpoints { srv_name: String, skipped: usize },

    #[error("none of the {discovered} discovered relay endpoints is reachable")]
    NoneReachable { discovered: usize },
}

/// Settings for a discovery run
#[derive(Debug, Clone)]
pub struct DiscoverySettings {
    /// Zone the SRV name lives under, e.g. `example.com`
    pub zone: String,
    pub service: String,
    pub protocol: String,
    /// Bound on probing the whole candidate set
    pub deadline: Duration,
}

impl DiscoverySettings {
    pub fn new(zone: impl Into<String>) -> Self {
        Self {
            zone: zone.into(),
            service: "vpn".to_string(),
            protocol: "udp".to_string(),
            deadline: Duration::from_secs(5),
        }
    }

    pub fn srv_name(&self) -> String {
        format!("_{}._{}.{}", self.service, self.protocol, self.zone.trim_end_matches('.'))
    }
}

/// Finds the fastest relay for a deployment
pub struct EndpointDiscovery {
    resolver: Arc<dyn ServiceResolver>,
    prober: Arc<dyn Prober>,
    settings: DiscoverySettings,
}

impl EndpointDiscovery {
    pub fn new(
        resolver: Arc<dyn ServiceResolver>,
        prober: Arc<dyn Prober>,
        settings: DiscoverySettings,
    ) -> Self {
        Self { resolver, prober, settings }
    }

    /// Resolves and probes every candidate. The result keeps SRV answer order.
    ///
    /// A candidate whose TXT or address lookup fails is skipped. An empty or
    /// failed SRV lookup is `NoEndpoints` with nothing skipped; SRV targets
    /// that all failed to resolve are `NoEndpoints` with their count.
    pub async fn discover(&self) -> Result<Vec<Endpoint>, DiscoveryError> {
        let srv_name = self.settings.srv_name();
        let no_endpoints = |skipped| DiscoveryError::NoEndpoints {
            srv_name: srv_name.clone(),
            skipped,
        };

        let records = match self.resolver.lookup_srv(&srv_name).await {
            Ok(records) => records,
            Err(e) => {
                warn!("Relay SRV lookup failed: {:#}", e);
                return Err(no_endpoints(0));
            }
        };
        if records.is_empty() {
            warn!("No SRV records found for {}", srv_name);
            return Err(no_endpoints(0));
        }

        let resolved = join_all(records.iter().map(|record| self.resolve_candidate(record))).await;
        let candidates: Vec<(String, String, String)> = resolved.into_iter().flatten().collect();
        if candidates.is_empty() {
            warn!(
                "All {} SRV targets of {} failed to resolve",
                records.len(), srv_name
            );
            return Err(no_endpoints(records.len()));
        }

        let deadline = Instant::now() + self.settings.deadline;
        let probes = candidates.iter().map(|(host, _, _)| async move {
            match tokio::time::timeout_at(deadline, self.prober.probe(host)).await {
                Ok(latency) => latency,
                Err(_) => Latency::Unreachable(ProbeFailure::Timeout),
            }
        });
        let latencies = join_all(probes).await;

        let endpoints: Vec<Endpoint> = candidates
            .into_iter()
            .zip(latencies)
            .map(|((remote_host, description, remote_ip), latency)| {
                metrics::record_probe(&remote_host, &latency);
                debug!(
                    "Probed endpoint {} ({}, {}): {}",
                    remote_host, remote_ip, description, latency
                );
                Endpoint { description, remote_host, remote_ip, latency }
            })
            .collect();

        Ok(endpoints)
    }

    /// Discovers candidates and returns the fastest reachable one
    pub async fn fastest(&self) -> Result<Endpoint, DiscoveryError> {
        let endpoints = self.discover().await?;

        match select_fastest(&endpoints) {
            Some(endpoint) => {
                info!(
                    "Selected relay {} ({}) at {}",
                    endpoint.remote_host, endpoint.description, endpoint.latency
                );
                Ok(endpoint.clone())
            }
            None => Err(DiscoveryError::NoneReachable { discovered: endpoints.len() }),
        }
    }

    /// Returns `(remote_host, description, remote_ip)`, or `None` to skip the record
    async fn resolve_candidate(&self, record: &SrvTarget) -> Option<(String, String, String)> {
        let host = record.target.as_str();
        let (txt, ips) = futures::join!(
            self.resolver.lookup_txt(host),
            self.resolver.lookup_ip(host)
        );

        let description = match txt.map(|records| records.into_iter().next()) {
            Ok(Some(description)) => description,
            Ok(None) => {
                warn!("Skipping relay {}: no TXT description", host);
                return None;
            }
            Err(e) => {
                warn!("Skipping relay {}: {:#}", host, e);
                return None;
            }
        };

        let remote_ip = match ips.map(|addrs| addrs.into_iter().next()) {
            Ok(Some(ip)) => ip.to_string(),
            Ok(None) => {
                warn!("Skipping relay {}: no address records", host);
                return None;
            }
            Err(e) => {
                warn!("Skipping relay {}: {:#}", host, e);
                return None;
            }
        };

        Some((host.to_string(), description, remote_ip))
    }
}

/// Picks the reachable endpoint with the strictly lowest latency.
///
/// Ties go to the earliest endpoint. `None` when nothing is reachable.
pub fn select_fastest(endpoints: &[Endpoint]) -> Option<&Endpoint> {
    let mut fastest: Option<(&Endpoint, u64)> = None;

    for endpoint in endpoints {
        let Some(ms) = endpoint.latency.as_millis() else {
            continue;
        };
        match fastest {
            Some((_, best)) if ms >= best => {}
            _ => fastest = Some((endpoint, ms)),
        }
    }

    fastest.map(|(endpoint, _)| endpoint)
}
