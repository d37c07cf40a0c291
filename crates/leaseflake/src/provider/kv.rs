//! Abstraction over the consensus KV store used to lease worker ids.
//!
//! Every operation here is synchronous and blocking, mirroring how the
//! leased provider's background thread drives it: one dedicated thread per
//! provider, parked on a blocking HTTP call or a condition variable rather
//! than juggling an async runtime for what is fundamentally a slow,
//! infrequent control-plane interaction.

use crate::error::Result;
use std::time::Duration;

/// The outcome of a single acquisition attempt against one candidate key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// The lock was not held by anyone and is now held by us.
    Acquired,
    /// Someone else currently holds the lock.
    Contended,
}

/// A consensus KV backend capable of exclusive, session-scoped locks.
///
/// A `key` here names one candidate worker-id slot (e.g.
/// `leaseflake/workers/17`). Implementations are expected to tie the lock to
/// a session with a TTL, so that a crashed holder's lock is eventually
/// reclaimed even without an explicit `release`.
pub trait LockBackend: Send + Sync {
    /// Attempts to acquire the lock at `key` under this backend's current
    /// session. Returns [`AcquireOutcome::Contended`] rather than erroring
    /// when the key is already held by another session.
    fn acquire(&self, key: &str) -> Result<AcquireOutcome>;

    /// Renews the session backing a currently-held lock. Must be called more
    /// frequently than the session TTL or the lock will be reclaimed by the
    /// backend.
    fn renew(&self) -> Result<()>;

    /// Releases the lock at `key` and destroys the backing session. A no-op
    /// if the lock is not currently held by this backend.
    fn release(&self, key: &str) -> Result<()>;

    /// Blocks until the backend observes that the currently held lock has
    /// been lost - expired, invalidated externally, or relinquished by a
    /// concurrent actor - or until `timeout` elapses, whichever is first.
    ///
    /// Returns `true` if loss was observed, `false` on a timeout with the
    /// lock presumably still held. Implementations are expected to long-poll
    /// rather than spin.
    fn wait_for_loss(&self, timeout: Duration) -> Result<bool>;
}
