pub mod client;
pub mod proto;
pub mod server;

pub use client::RelayClient;
pub use server::{NerfService, OverlaySettings};
