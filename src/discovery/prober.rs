use std::time::{Duration, Instant};
use async_trait::async_trait;
use tonic::transport::Endpoint as TransportEndpoint;
use tracing::debug;

use super::endpoint::{Latency, ProbeFailure};
use crate::grpc::proto::{NerfClient, PingRequest};

pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(1);

/// Measures the round trip to one relay
#[async_trait]
pub trait Prober: Send + Sync {
    /// Never fails outright: problems come back as `Latency::Unreachable`
    async fn probe(&self, remote_host: &str) -> Latency;
}

/// Probes relays with a `Ping` over the control port
#[derive(Debug, Clone)]
pub struct GrpcProber {
    port: u16,
    timeout: Duration,
    login: String,
}

impl GrpcProber {
    pub fn new(port: u16, timeout: Duration, login: impl Into<String>) -> Self {
        Self {
            port,
            timeout,
            login: login.into(),
        }
    }

    async fn ping(&self, remote_host: &str, started: Instant) -> Result<(), ProbeFailure> {
        let url = format!("http://{}:{}", remote_host, self.port);
        let channel = TransportEndpoint::from_shared(url)
            .map_err(|e| ProbeFailure::Connect(e.to_string()))?
            .connect_timeout(self.timeout)
            .timeout(self.timeout)
            .connect()
            .await
            .map_err(|e| ProbeFailure::Connect(e.to_string()))?;

        let nonce = chrono::Utc::now()
            .timestamp_nanos_opt()
            .unwrap_or_else(|| started.elapsed().as_nanos() as i64);

        let mut client = NerfClient::new(channel);
        let response = client
            .ping(PingRequest {
                data: nonce,
                login: self.login.clone(),
            })
            .await
            .map_err(|status| ProbeFailure::Rpc(status.message().to_string()))?;

        if response.into_inner().data == 0 {
            return Err(ProbeFailure::InvalidReply);
        }

        Ok(())
    }
}

#[async_trait]
impl Prober for GrpcProber {
    async fn probe(&self, remote_host: &str) -> Latency {
        let started = Instant::now();

        // Bounds connect and call together, whatever the transport does
        let outcome = match tokio::time::timeout(self.timeout, self.ping(remote_host, started)).await {
            Ok(result) => result,
            Err(_) => Err(ProbeFailure::Timeout),
        };

        let latency = match outcome {
            Ok(()) => Latency::Reachable(started.elapsed().as_millis() as u64),
            Err(reason) => Latency::Unreachable(reason),
        };

        debug!("Probed {}: {}", remote_host, latency);
        latency
    }
}
