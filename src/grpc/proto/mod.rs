// Include the generated protobuf code
pub mod nerf {
    tonic::include_proto!("nerf");
}

// Re-export all the important types from the generated code
pub use self::nerf::{
    // Messages
    PingRequest, PingResponse,
    ConnectRequest, ConnectResponse,
    DisconnectRequest, DisconnectResponse,
    
    // Service traits
    nerf_server::{Nerf, NerfServer},
    nerf_client::NerfClient,
};
