pub mod config;
pub mod directory;
pub mod discovery;
pub mod grpc;
pub mod metrics;
pub mod modes;
pub mod nebula;

// Re-export important types and functions for easier access
pub use directory::{DirectoryCache, DirectorySyncer, MembershipResolver};
pub use discovery::{select_fastest, Endpoint, EndpointDiscovery, Latency};
pub use grpc::NerfService;
