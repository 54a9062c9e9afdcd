use std::collections::BTreeMap;
use serde::{Deserialize, Serialize};

use super::cert::Certificate;
use super::{LightHouse, Subnet};

/// Underlay port every node listens on
pub const NEBULA_PORT: u16 = 4242;

const HEADER: &str = "# Generated by Nerf\n\n";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NebulaConfig {
    pub pki: Pki,
    pub static_host_map: BTreeMap<String, Vec<String>>,
    pub lighthouse: LightHouseSection,
    pub listen: Listen,
    pub local_range: String,
    pub tun: Tun,
    pub firewall: Firewall,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pki {
    pub ca: String,
    pub cert: String,
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LightHouseSection {
    pub am_lighthouse: bool,
    pub interval: u32,
    pub hosts: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listen {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tun {
    pub disabled: bool,
    pub dev: String,
    pub unsafe_routes: Vec<UnsafeRoute>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnsafeRoute {
    pub route: String,
    pub via: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Firewall {
    pub outbound: Vec<FirewallRule>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FirewallRule {
    pub port: String,
    pub proto: String,
    pub host: String,
}

impl NebulaConfig {
    /// Client config that sends all traffic through the lighthouse
    pub fn for_client(certificate: &Certificate, lighthouse: &LightHouse, subnet: &Subnet) -> Self {
        let lighthouse_ip = lighthouse.nebula_ip.to_string();

        let mut static_host_map = BTreeMap::new();
        static_host_map.insert(
            lighthouse_ip.clone(),
            vec![format!("{}:{}", lighthouse.public_ip, NEBULA_PORT)],
        );

        // Two halves instead of 0.0.0.0/0 so they win over the default route
        let unsafe_routes = ["0.0.0.0/1", "128.0.0.0/1"]
            .iter()
            .map(|route| UnsafeRoute {
                route: route.to_string(),
                via: lighthouse_ip.clone(),
            })
            .collect();

        Self {
            pki: Pki {
                ca: certificate.ca.clone(),
                cert: certificate.crt.clone(),
                key: certificate.key.clone(),
            },
            static_host_map,
            lighthouse: LightHouseSection {
                am_lighthouse: false,
                interval: 60,
                hosts: vec![lighthouse_ip.clone()],
            },
            listen: Listen {
                host: "0.0.0.0".to_string(),
                port: NEBULA_PORT,
            },
            local_range: subnet.to_string(),
            tun: Tun {
                disabled: false,
                dev: "nebula1".to_string(),
                unsafe_routes,
            },
            firewall: Firewall {
                outbound: vec![FirewallRule {
                    port: "any".to_string(),
                    proto: "any".to_string(),
                    host: "any".to_string(),
                }],
            },
        }
    }
}

/// Renders the client's `config.yml`
pub fn render_config(
    certificate: &Certificate,
    lighthouse: &LightHouse,
    subnet: &Subnet,
) -> Result<String, serde_yaml::Error> {
    let config = NebulaConfig::for_client(certificate, lighthouse, subnet);
    let body = serde_yaml::to_string(&config)?;
    Ok(format!("{}{}", HEADER, body))
}
