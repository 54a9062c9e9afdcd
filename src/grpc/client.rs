use std::time::Duration;
use anyhow::{anyhow, Result};
use tonic::transport::{Channel, Endpoint as TransportEndpoint};
use tracing::debug;

use super::proto::{ConnectRequest, ConnectResponse, DisconnectRequest, NerfClient};

/// Client for the relay chosen by discovery
pub struct RelayClient {
    client: NerfClient<Channel>,
    remote_host: String,
}

impl RelayClient {
    /// Connect to the relay's control port
    pub async fn connect(remote_host: &str, port: u16, timeout: Duration) -> Result<Self> {
        let url = format!("http://{}:{}", remote_host, port);
        let channel = TransportEndpoint::from_shared(url.clone())?
            .connect_timeout(timeout)
            .timeout(timeout)
            .connect()
            .await
            .map_err(|e| anyhow!("Failed to connect to relay at {}: {}", url, e))?;

        Ok(Self {
            client: NerfClient::new(channel),
            remote_host: remote_host.to_string(),
        })
    }

    /// Request an overlay config for `login`
    pub async fn request_config(&mut self, login: &str, token: &str) -> Result<ConnectResponse> {
        let request = ConnectRequest {
            login: login.to_string(),
            token: token.to_string(),
        };

        let response = self.client
            .connect(request)
            .await
            .map_err(|status| anyhow!("Relay {} refused config request: {}", self.remote_host, status.message()))?;

        let response = response.into_inner();
        debug!(
            "Relay {} assigned {} (lighthouse {}, teams {:?})",
            self.remote_host, response.client_ip, response.lighthouse_ip, response.teams
        );
        Ok(response)
    }

    /// Tell the relay `login` is going away
    pub async fn disconnect(&mut self, login: &str) -> Result<()> {
        self.client
            .disconnect(DisconnectRequest { login: login.to_string() })
            .await
            .map_err(|status| anyhow!("Disconnect from relay {} failed: {}", self.remote_host, status.message()))?;
        Ok(())
    }
}
