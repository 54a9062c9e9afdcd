use std::fmt;
use thiserror::Error;

/// Why a probe produced no latency
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeFailure {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("ping failed: {0}")]
    Rpc(String),

    #[error("timed out")]
    Timeout,

    #[error("empty ping reply")]
    InvalidReply,
}

/// Result of probing one relay
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Latency {
    /// Measured round trip in milliseconds
    Reachable(u64),
    Unreachable(ProbeFailure),
}

impl Latency {
    pub fn as_millis(&self) -> Option<u64> {
        match self {
            Latency::Reachable(ms) => Some(*ms),
            Latency::Unreachable(_) => None,
        }
    }

    pub fn is_reachable(&self) -> bool {
        matches!(self, Latency::Reachable(_))
    }
}

impl fmt::Display for Latency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Latency::Reachable(ms) => write!(f, "{}ms", ms),
            Latency::Unreachable(reason) => write!(f, "unreachable ({})", reason),
        }
    }
}

/// A relay candidate discovered through DNS
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Human label from the target's TXT record
    pub description: String,
    /// SRV target, used for the control-port connection
    pub remote_host: String,
    /// Routable address of the target
    pub remote_ip: String,
    pub latency: Latency,
}
