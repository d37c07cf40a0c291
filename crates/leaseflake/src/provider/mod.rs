//! Worker-id providers: the source of the `worker` field packed into every
//! generated id.

mod interface;
mod kv;
mod leased;
mod static_provider;

pub use interface::WorkerIdProvider;
pub use kv::{AcquireOutcome, LockBackend};
pub use leased::{LeasedProvider, LeasedProviderConfig};
pub use static_provider::StaticProvider;

#[cfg(feature = "consul")]
mod consul;
#[cfg(feature = "consul")]
pub use consul::{ConsulBackend, ConsulBackendConfig};
