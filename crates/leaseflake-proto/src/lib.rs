//! Generated gRPC bindings for the id-generation service, plus the mapping
//! from [`leaseflake::Error`] onto `tonic::Status` used at the service
//! boundary.

mod error;

pub use error::Error;

/// Generated protobuf types and the `IdGenerator` service traits.
pub mod proto {
    tonic::include_proto!("leaseflake");

    /// Encoded file descriptor set, used to register gRPC server reflection.
    pub const FILE_DESCRIPTOR_SET: &[u8] =
        tonic::include_file_descriptor_set!("leaseflake_descriptor");
}

pub use leaseflake;
