use crate::error::{Error, Result};
use crate::id::MAX_WORKER_ID;
use crate::provider::WorkerIdProvider;

/// A [`WorkerIdProvider`] backed by a fixed, operator-assigned worker id.
///
/// Used when worker ids are allocated out of band (e.g. by a StatefulSet's
/// ordinal index) and no consensus KV lease is needed.
#[derive(Debug, Clone, Copy)]
pub struct StaticProvider {
    worker_id: i64,
}

impl StaticProvider {
    /// Creates a provider fixed at `worker_id`.
    ///
    /// # Errors
    /// Returns [`Error::OutOfRange`] if `worker_id` is outside `[0, 255]`.
    pub fn new(worker_id: i64) -> Result<Self> {
        if !(0..=MAX_WORKER_ID).contains(&worker_id) {
            return Err(Error::OutOfRange {
                field: "worker_id",
                value: worker_id,
                max: MAX_WORKER_ID,
            });
        }
        Ok(Self { worker_id })
    }
}

impl WorkerIdProvider for StaticProvider {
    fn get_worker_id(&self) -> Result<i64> {
        Ok(self.worker_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_out_of_range_ids() {
        assert!(StaticProvider::new(256).is_err());
        assert!(StaticProvider::new(-1).is_err());
    }

    #[test]
    fn returns_the_configured_id_every_time() {
        let provider = StaticProvider::new(42).unwrap();
        for _ in 0..5 {
            assert_eq!(provider.get_worker_id().unwrap(), 42);
        }
    }
}
