//! Builds the gRPC client and server code for `leaseflake.proto`.
//!
//! Code generation processes the protobuf definition in `proto/` and emits
//! Rust modules with gRPC bindings into the crate's `OUT_DIR`, along with an
//! encoded file descriptor set for use by gRPC server reflection.
use std::env;
use std::path::PathBuf;

fn main() {
    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());
    let descriptor_path = out_dir.join("leaseflake_descriptor.bin");

    let config = tonic_prost_build::Config::new();

    tonic_prost_build::configure()
        .file_descriptor_set_path(&descriptor_path)
        .compile_with_config(config, &["proto/leaseflake.proto"], &["proto"])
        .unwrap();
}
