use crate::error::Result;

/// A source of the `worker` field used by a [`crate::composer::Composer`].
///
/// Implementations are expected to be cheap and non-blocking: the composer
/// calls `get_worker_id` on every `next_id` call, while holding no lock of
/// its own by that point.
pub trait WorkerIdProvider: Send + Sync {
    /// Returns the current worker id, or an error if none is currently
    /// available (see [`crate::error::Error::ProviderUnavailable`]).
    fn get_worker_id(&self) -> Result<i64>;
}
