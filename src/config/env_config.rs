use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::directory::github::DEFAULT_API_URL;
use crate::modes::OperationMode;
use crate::nebula::{LightHouse, Subnet};

#[derive(Error, Debug)]
pub enum EnvConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),

    #[error("Invalid environment variable value for {0}: {1}")]
    InvalidEnvValue(String, String),
}

/// Settings only the relay server reads
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub listen_addr: SocketAddr,
    pub organization: String,
    pub github_token: String,
    pub github_api_url: String,
    pub directory_page_size: u32,
    pub sync_interval: Duration,
    pub cache_ttl: Duration,
    pub lighthouse: LightHouse,
    pub nebula_subnet: Subnet,
    pub nebula_cert_bin: PathBuf,
    pub cert_dir: PathBuf,
    pub cert_duration: String,
    pub metrics_addr: Option<SocketAddr>,
}

/// Settings only the client reads
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub dns_zone: String,
    pub dns_server: SocketAddr,
    pub dns_timeout: Duration,
    pub probe_timeout: Duration,
    pub discovery_deadline: Duration,
    /// Bound on connecting to the chosen relay and each call made to it
    pub rpc_timeout: Duration,
    pub login: String,
    pub token: String,
    pub nebula_dir: PathBuf,
    pub nebula_bin: PathBuf,
}

#[derive(Debug, Clone)]
pub struct EnvConfig {
    // Core settings
    pub mode: OperationMode,
    pub log_level: String,
    pub control_port: u16,

    // Mode-specific settings; exactly one is set
    pub server: Option<ServerSettings>,
    pub client: Option<ClientSettings>,
}

impl EnvConfig {
    pub fn from_env(mode: OperationMode) -> Result<Self, EnvConfigError> {
        Self::from_lookup(mode, |key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable lookup
    pub fn from_lookup<F>(mode: OperationMode, lookup: F) -> Result<Self, EnvConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars { lookup };

        let log_level = vars.get("NERF_LOG_LEVEL").unwrap_or_else(|| "info".to_string());
        let control_port = vars.parse_or("NERF_CONTROL_PORT", 9000u16, "a valid port number (0-65535)")?;

        let mut config = EnvConfig {
            mode,
            log_level,
            control_port,
            server: None,
            client: None,
        };

        match mode {
            OperationMode::Server => {
                config.server = Some(Self::server_settings(&vars, control_port)?);
            }
            OperationMode::Client => {
                config.client = Some(Self::client_settings(&vars)?);
            }
        }

        Ok(config)
    }

    fn server_settings<F>(vars: &Vars<F>, control_port: u16) -> Result<ServerSettings, EnvConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let default_listen = SocketAddr::from(([0, 0, 0, 0], control_port));

        Ok(ServerSettings {
            listen_addr: vars.parse_or("NERF_LISTEN_ADDR", default_listen, "a socket address")?,
            organization: vars.require("NERF_ORGANIZATION")?,
            github_token: vars.require("NERF_GITHUB_TOKEN")?,
            github_api_url: vars.get("NERF_GITHUB_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            directory_page_size: vars.parse_or("NERF_DIRECTORY_PAGE_SIZE", 500u32, "a positive integer")?,
            sync_interval: Duration::from_secs(
                vars.parse_or("NERF_SYNC_INTERVAL_SECONDS", 10u64, "a positive integer")?,
            ),
            cache_ttl: Duration::from_secs(
                vars.parse_or("NERF_CACHE_TTL_SECONDS", 3600u64, "a positive integer")?,
            ),
            lighthouse: vars.parse_required("NERF_LIGHTHOUSE", "<NebulaIP>:<PublicIP>")?,
            nebula_subnet: vars.parse_or(
                "NERF_NEBULA_SUBNET",
                Subnet { network: [10, 0, 0, 0].into(), prefix_len: 16 },
                "an IPv4 CIDR",
            )?,
            nebula_cert_bin: vars
                .get("NERF_NEBULA_CERT_BIN")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("/usr/local/nebula/nebula-cert")),
            cert_dir: vars
                .get("NERF_CERT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("/etc/nebula/certs")),
            cert_duration: vars.get("NERF_CERT_DURATION").unwrap_or_else(|| "48h".to_string()),
            metrics_addr: vars.parse_optional("NERF_METRICS_ADDR", "a socket address")?,
        })
    }

    fn client_settings<F>(vars: &Vars<F>) -> Result<ClientSettings, EnvConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let nebula_dir = vars
            .get("NERF_NEBULA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("/opt/nebula"));
        let nebula_bin = vars
            .get("NERF_NEBULA_BIN")
            .map(PathBuf::from)
            .unwrap_or_else(|| nebula_dir.join("nebula"));

        Ok(ClientSettings {
            dns_zone: vars.require("NERF_DNS_ZONE")?,
            dns_server: vars.parse_or(
                "NERF_DNS_SERVER",
                SocketAddr::from(([1, 1, 1, 1], 53)),
                "a socket address",
            )?,
            dns_timeout: Duration::from_secs(
                vars.parse_or("NERF_DNS_TIMEOUT_SECONDS", 3u64, "a positive integer")?,
            ),
            probe_timeout: Duration::from_millis(
                vars.parse_or("NERF_PROBE_TIMEOUT_MS", 1000u64, "a positive integer")?,
            ),
            discovery_deadline: Duration::from_millis(
                vars.parse_or("NERF_DISCOVERY_DEADLINE_MS", 5000u64, "a positive integer")?,
            ),
            rpc_timeout: Duration::from_millis(
                vars.parse_or("NERF_RPC_TIMEOUT_MS", 10_000u64, "a positive integer")?,
            ),
            login: vars.require("NERF_LOGIN")?,
            token: vars.require("NERF_TOKEN")?,
            nebula_dir,
            nebula_bin,
        })
    }
}

/// Variable lookup with typed parsing helpers
struct Vars<F> {
    lookup: F,
}

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|value| !value.is_empty())
    }

    fn require(&self, name: &str) -> Result<String, EnvConfigError> {
        self.get(name).ok_or_else(|| EnvConfigError::MissingEnv(name.to_string()))
    }

    fn parse_value<T: std::str::FromStr>(name: &str, value: &str, expected: &str) -> Result<T, EnvConfigError> {
        value.parse::<T>().map_err(|_| EnvConfigError::InvalidEnvValue(
            name.to_string(),
            format!("Expected {}. Got: {}", expected, value)
        ))
    }

    fn parse_or<T: std::str::FromStr>(&self, name: &str, default: T, expected: &str) -> Result<T, EnvConfigError> {
        match self.get(name) {
            Some(value) => Self::parse_value(name, &value, expected),
            None => Ok(default),
        }
    }

    fn parse_optional<T: std::str::FromStr>(&self, name: &str, expected: &str) -> Result<Option<T>, EnvConfigError> {
        self.get(name)
            .map(|value| Self::parse_value(name, &value, expected))
            .transpose()
    }

    fn parse_required<T: std::str::FromStr>(&self, name: &str, expected: &str) -> Result<T, EnvConfigError> {
        let value = self.require(name)?;
        Self::parse_value(name, &value, expected)
    }
}
