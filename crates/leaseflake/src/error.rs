//! Error types for the ID composer and worker-id providers.
//!
//! These are transport-agnostic; the `leaseflake-proto` crate maps them onto
//! `tonic::Status` at the gRPC boundary.

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for `leaseflake`.
#[derive(Clone, thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The Leased Provider is `Unavailable` and `preserve_on_loss` is `false`.
    #[error("worker-id provider is unavailable")]
    ProviderUnavailable,

    /// The 41-bit timestamp field has overflowed relative to the configured
    /// epoch. Unreachable for ~69 years after the epoch.
    #[error("epoch exhausted: timestamp no longer fits in 41 bits")]
    EpochExhausted,

    /// The wall clock moved backwards further than the composer's bounded
    /// catch-up wait could absorb.
    #[error("clock moved backwards by more than the allowed catch-up window")]
    ClockMovedBackwards,

    /// A configured static worker id or datacenter id fell outside its valid
    /// range. Fatal at startup.
    #[error("{field} must be in [0, {max}], got {value}")]
    OutOfRange {
        field: &'static str,
        value: i64,
        max: i64,
    },

    /// The consensus KV backend returned an error unrelated to lock
    /// contention (network failure, malformed response, etc).
    #[error("lock backend error: {0}")]
    BackendError(String),
}
