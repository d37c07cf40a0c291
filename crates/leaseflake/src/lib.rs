//! Core library for `leaseflake`: a Snowflake-style 64-bit id composer with
//! a worker-id lease negotiated over a consensus KV store.
//!
//! The two pieces that matter are [`Composer`], which turns the current
//! time, a datacenter id, a worker id, and a per-millisecond sequence
//! counter into a packed id, and [`WorkerIdProvider`], the trait that
//! supplies that worker id - either [`StaticProvider`] for a fixed,
//! operator-assigned id, or [`LeasedProvider`] for one leased from a
//! consensus KV store and renewed for the life of the process.

pub mod composer;
pub mod error;
pub mod id;
mod mutex;
pub mod provider;
pub mod time;

pub use composer::Composer;
pub use error::{Error, Result};
pub use id::{Fields, unpack};
pub use provider::{LeasedProvider, LeasedProviderConfig, StaticProvider, WorkerIdProvider};
pub use time::{Clock, SystemClock};

#[cfg(feature = "consul")]
pub use provider::{ConsulBackend, ConsulBackendConfig};
