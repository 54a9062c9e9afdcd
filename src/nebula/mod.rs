// Overlay network support for Nerf
//
// Everything the relay needs to hand a client a working overlay config:
// its address inside the mesh, a team-scoped certificate and the config file.

pub mod cert;
pub mod config;

pub use cert::{Certificate, CertificateIssuer, IssueError, NebulaCertIssuer};
pub use config::render_config;

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("Invalid subnet {0}: expected <IPv4>/<prefix>")]
    Subnet(String),

    #[error("Invalid lighthouse {0}: expected <NebulaIP>:<PublicIP>, both IPv4")]
    LightHouse(String),
}

/// An IPv4 overlay subnet in CIDR form
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subnet {
    pub network: Ipv4Addr,
    pub prefix_len: u8,
}

impl FromStr for Subnet {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || AddressError::Subnet(s.to_string());
        let (network, prefix_len) = s.split_once('/').ok_or_else(invalid)?;

        let network = network.parse::<Ipv4Addr>().map_err(|_| invalid())?;
        let prefix_len = prefix_len.parse::<u8>().map_err(|_| invalid())?;
        if prefix_len > 32 {
            return Err(invalid());
        }

        Ok(Self { network, prefix_len })
    }
}

impl fmt::Display for Subnet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix_len)
    }
}

/// The lighthouse every client is pointed at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LightHouse {
    /// Address inside the overlay
    pub nebula_ip: Ipv4Addr,
    /// Address on the underlay the overlay is reached through
    pub public_ip: Ipv4Addr,
}

impl FromStr for LightHouse {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || AddressError::LightHouse(s.to_string());
        let (nebula_ip, public_ip) = s.split_once(':').ok_or_else(invalid)?;

        Ok(Self {
            nebula_ip: nebula_ip.parse().map_err(|_| invalid())?,
            public_ip: public_ip.parse().map_err(|_| invalid())?,
        })
    }
}

/// Overlay address of `login`: the login's CRC-16 offset into the subnet
pub fn client_ip(login: &str, subnet: &Subnet) -> Ipv4Addr {
    let base = u32::from(subnet.network);
    Ipv4Addr::from(base.wrapping_add(u32::from(crc16_ccitt(login.as_bytes()))))
}

/// CRC-16/CCITT-FALSE: poly 0x1021, init 0xFFFF, no reflection
fn crc16_ccitt(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for byte in data {
        crc ^= u16::from(*byte) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ 0x1021
            } else {
                crc << 1
            };
        }
    }
    crc
}
