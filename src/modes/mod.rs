use std::fmt;

pub mod client;
pub mod server;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationMode {
    Server,
    Client,
}

impl fmt::Display for OperationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationMode::Server => write!(f, "Relay Server Mode"),
            OperationMode::Client => write!(f, "Client Mode"),
        }
    }
}
