//! Error types for the id-generation service boundary.
//!
//! Wraps [`leaseflake::Error`] with the handful of cases that only make
//! sense at the gRPC layer, and implements `From<Error> for tonic::Status`
//! for seamless propagation to clients.

use tonic::Status;

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for the id-generation service.
#[derive(Clone, thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The composer or its worker-id provider reported a failure.
    #[error(transparent)]
    Core(#[from] leaseflake::Error),

    /// A request arrived while the service was shutting down.
    #[error("service is shutting down")]
    ServiceShutdown,
}

impl From<Error> for Status {
    fn from(err: Error) -> Self {
        match err {
            // The service intentionally does not distinguish composer
            // failures on the wire: a caller cannot act differently on
            // "provider unavailable" vs. "clock moved backwards" vs. any
            // other internal invariant violation, so all of them flatten to
            // one opaque internal status.
            Error::Core(err) => Self::internal(format!("internal error: {err}")),
            Error::ServiceShutdown => Self::unavailable("service is shutting down"),
        }
    }
}
