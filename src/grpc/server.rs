use std::sync::Arc;
use tonic::{Request, Response, Status};
use tracing::{debug, error, info, warn};

use super::proto::{
    ConnectRequest, ConnectResponse, DisconnectRequest, DisconnectResponse, Nerf, NerfServer,
    PingRequest, PingResponse,
};
use crate::directory::{MembershipResolver, TokenVerifier};
use crate::nebula::{self, CertificateIssuer, LightHouse, Subnet};

/// Overlay settings the relay hands to every client
#[derive(Debug, Clone)]
pub struct OverlaySettings {
    pub lighthouse: LightHouse,
    pub subnet: Subnet,
}

/// Relay control service: probes, config requests and disconnect notices
pub struct NerfService {
    membership: MembershipResolver,
    verifier: Arc<dyn TokenVerifier>,
    issuer: Arc<dyn CertificateIssuer>,
    overlay: OverlaySettings,
}

impl NerfService {
    pub fn new(
        membership: MembershipResolver,
        verifier: Arc<dyn TokenVerifier>,
        issuer: Arc<dyn CertificateIssuer>,
        overlay: OverlaySettings,
    ) -> Self {
        Self {
            membership,
            verifier,
            issuer,
            overlay,
        }
    }

    pub fn into_server(self) -> NerfServer<Self> {
        NerfServer::new(self)
    }
}

/// Current time in milliseconds since the epoch, rounded to the nearest millisecond
fn now_millis() -> i64 {
    let now = chrono::Utc::now();
    now.timestamp() * 1000 + (i64::from(now.timestamp_subsec_micros()) + 500) / 1000
}

#[tonic::async_trait]
impl Nerf for NerfService {
    async fn ping(&self, request: Request<PingRequest>) -> Result<Response<PingResponse>, Status> {
        let req = request.into_inner();
        if req.login.is_empty() {
            return Err(Status::invalid_argument("failed ping request: empty login"));
        }

        debug!("Got ping request from {}", req.login);
        Ok(Response::new(PingResponse { data: now_millis() }))
    }

    async fn connect(&self, request: Request<ConnectRequest>) -> Result<Response<ConnectResponse>, Status> {
        let req = request.into_inner();
        if req.login.is_empty() {
            return Err(Status::invalid_argument("failed certificate request: empty login"));
        }

        debug!("Connect request from {}", req.login);

        let login = self.verifier.verify(&req.token).await.map_err(|e| {
            warn!("Failed to validate login {}: {}", req.login, e);
            Status::unauthenticated(format!("failed to validate login {}", req.login))
        })?;

        let teams: Vec<String> = self.membership.membership_of(&login).into_iter().collect();
        if teams.is_empty() {
            debug!("No teams found for {}", login);
            return Err(Status::permission_denied("no teams found"));
        }

        let subnet = self.overlay.subnet;
        let client_ip = nebula::client_ip(&login, &subnet);

        let certificate = self.issuer
            .issue(&login, client_ip, subnet.prefix_len, &teams)
            .await
            .map_err(|e| {
                error!("Failed to issue certificate for {} (teams: {:?}): {}", login, teams, e);
                Status::internal("failed to issue certificate")
            })?;

        let config = nebula::render_config(&certificate, &self.overlay.lighthouse, &subnet)
            .map_err(|e| {
                error!("Failed to render overlay config for {}: {}", login, e);
                Status::internal("failed to generate config")
            })?;

        info!("Issued config for {} ({}) with teams {:?}", login, client_ip, teams);

        Ok(Response::new(ConnectResponse {
            config,
            client_ip: client_ip.to_string(),
            lighthouse_ip: self.overlay.lighthouse.nebula_ip.to_string(),
            teams,
        }))
    }

    async fn disconnect(
        &self,
        request: Request<DisconnectRequest>,
    ) -> Result<Response<DisconnectResponse>, Status> {
        let req = request.into_inner();
        if req.login.is_empty() {
            return Err(Status::invalid_argument("failed disconnect request: empty login"));
        }

        info!("{} disconnected", req.login);
        Ok(Response::new(DisconnectResponse {}))
    }
}
