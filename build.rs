fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Tell Cargo to rerun this build script if the proto file changes
    println!("cargo:rerun-if-changed=src/grpc/proto/nerf.proto");
    
    // Both sides of the relay RPC live in this crate
    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        // The `Connect` RPC collides with the generated `NerfClient::connect`
        // transport constructor; clients are built via `NerfClient::new`.
        .build_transport(false)
        .compile(&["src/grpc/proto/nerf.proto"], &["src/grpc/proto"])?;
    
    Ok(())
}
