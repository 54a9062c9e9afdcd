use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use async_trait::async_trait;
use anyhow::{Context, Result};
use tracing::trace;
use trust_dns_resolver::TokioAsyncResolver;
use trust_dns_resolver::config::{NameServerConfigGroup, ResolverConfig, ResolverOpts};

/// One SRV answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SrvTarget {
    /// Target host without the trailing root dot
    pub target: String,
    pub port: u16,
    pub priority: u16,
    pub weight: u16,
}

/// The DNS lookups relay discovery needs
#[async_trait]
pub trait ServiceResolver: Send + Sync {
    async fn lookup_srv(&self, name: &str) -> Result<Vec<SrvTarget>>;

    async fn lookup_txt(&self, host: &str) -> Result<Vec<String>>;

    async fn lookup_ip(&self, host: &str) -> Result<Vec<IpAddr>>;
}

/// Resolver pinned to one recursive nameserver, independent of the host's
/// resolver configuration
pub struct DnsServiceResolver {
    resolver: TokioAsyncResolver,
}

impl DnsServiceResolver {
    pub fn new(nameserver: SocketAddr, timeout: Duration) -> Self {
        let nameservers = NameServerConfigGroup::from_ips_clear(
            &[nameserver.ip()],
            nameserver.port(),
            true,
        );
        let config = ResolverConfig::from_parts(None, Vec::new(), nameservers);

        let mut opts = ResolverOpts::default();
        opts.timeout = timeout;
        opts.attempts = 1;

        Self {
            resolver: TokioAsyncResolver::tokio(config, opts),
        }
    }
}

#[async_trait]
impl ServiceResolver for DnsServiceResolver {
    async fn lookup_srv(&self, name: &str) -> Result<Vec<SrvTarget>> {
        let lookup = self.resolver
            .srv_lookup(name)
            .await
            .with_context(|| format!("SRV lookup failed for {}", name))?;

        let targets: Vec<SrvTarget> = lookup
            .iter()
            .map(|srv| SrvTarget {
                target: srv.target().to_utf8().trim_end_matches('.').to_string(),
                port: srv.port(),
                priority: srv.priority(),
                weight: srv.weight(),
            })
            .collect();

        trace!("SRV {} -> {:?}", name, targets);
        Ok(targets)
    }

    async fn lookup_txt(&self, host: &str) -> Result<Vec<String>> {
        let lookup = self.resolver
            .txt_lookup(host)
            .await
            .with_context(|| format!("TXT lookup failed for {}", host))?;

        Ok(lookup
            .iter()
            .map(|txt| {
                txt.txt_data()
                    .iter()
                    .map(|chunk| String::from_utf8_lossy(chunk))
                    .collect::<String>()
            })
            .collect())
    }

    async fn lookup_ip(&self, host: &str) -> Result<Vec<IpAddr>> {
        let lookup = self.resolver
            .lookup_ip(host)
            .await
            .with_context(|| format!("Address lookup failed for {}", host))?;

        Ok(lookup.iter().collect())
    }
}
