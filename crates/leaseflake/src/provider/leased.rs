//! The leased worker-id provider: the hard part.
//!
//! A [`LeasedProvider`] runs a dedicated background thread that holds an
//! exclusive lock on exactly one worker-id slot in a consensus KV store (see
//! [`LockBackend`]), renews it periodically, and republishes a fresh slot if
//! the held one is ever lost. Callers only ever see the published worker id
//! through [`WorkerIdProvider::get_worker_id`], which never blocks.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use portable_atomic::{AtomicBool, AtomicI64, Ordering};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::provider::kv::{AcquireOutcome, LockBackend};
use crate::provider::interface::WorkerIdProvider;

/// Tuning knobs for a [`LeasedProvider`].
#[derive(Debug, Clone)]
pub struct LeasedProviderConfig {
    /// KV key prefix under which candidate worker-id slots live, e.g.
    /// `leaseflake/workers`. The full key for worker `n` is
    /// `{key_prefix}/{n}`.
    pub key_prefix: String,
    /// Number of candidate worker-id slots to scan, starting from `scan_hint`
    /// and wrapping. Defaults to 256 (the full 8-bit worker field).
    pub worker_count: i64,
    /// The slot id the scan starts from. Round-robining this across
    /// processes (e.g. seeding it from a pod ordinal) reduces contention on
    /// slot 0 at startup.
    pub scan_hint: i64,
    /// When `true`, a lost lease does not flip the provider back to
    /// `Unavailable`: the last published worker id keeps being served while
    /// a reacquisition attempt runs in the background. This trades strict
    /// uniqueness for availability.
    pub preserve_on_loss: bool,
    /// How often the background thread renews its held lock and polls for
    /// loss.
    pub renew_interval: Duration,
    /// How long to sleep between full scans when every candidate slot is
    /// contended.
    pub retry_backoff: Duration,
}

impl Default for LeasedProviderConfig {
    fn default() -> Self {
        Self {
            key_prefix: "leaseflake/workers".to_string(),
            worker_count: crate::id::MAX_WORKER_ID + 1,
            scan_hint: 0,
            preserve_on_loss: true,
            renew_interval: Duration::from_secs(5),
            retry_backoff: Duration::from_secs(1),
        }
    }
}

/// A [`WorkerIdProvider`] whose worker id is leased from a consensus KV
/// store and can change over the process lifetime.
///
/// `get_worker_id` is lock-free: it reads two atomics published by the
/// background thread. The worker id is stored with [`Ordering::Relaxed`]
/// and the availability flag with [`Ordering::Release`]; readers load
/// availability with [`Ordering::Acquire`] first, so observing `available
/// == true` guarantees the corresponding worker id load sees the value that
/// was published alongside it, not a stale one.
pub struct LeasedProvider {
    worker_id: AtomicI64,
    available: AtomicBool,
    cancel: CancellationToken,
    handle: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl LeasedProvider {
    /// Spawns the background lease-management thread and returns a handle to
    /// it. The returned provider starts `Unavailable` until the first slot
    /// is acquired.
    pub fn spawn(backend: Arc<dyn LockBackend>, config: LeasedProviderConfig) -> Arc<Self> {
        let provider = Arc::new(Self {
            worker_id: AtomicI64::new(0),
            available: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            handle: std::sync::Mutex::new(None),
        });

        let thread_provider = Arc::clone(&provider);
        let handle = std::thread::Builder::new()
            .name("leaseflake-lease".into())
            .spawn(move || thread_provider.run(backend, config))
            .expect("failed to spawn lease-management thread");

        *provider.handle.lock().unwrap() = Some(handle);
        provider
    }

    /// Signals the background thread to release its lock and exit, then
    /// waits for it to finish. Safe to call more than once.
    pub fn stop(&self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.lock().unwrap().take() {
            let _ = handle.join();
        }
    }

    fn publish(&self, worker_id: i64) {
        self.worker_id.store(worker_id, Ordering::Relaxed);
        self.available.store(true, Ordering::Release);
    }

    fn unpublish(&self) {
        self.available.store(false, Ordering::Release);
    }

    /// The background thread body: acquire a slot, hold it, react to loss.
    fn run(self: Arc<Self>, backend: Arc<dyn LockBackend>, config: LeasedProviderConfig) {
        let worker_count = config.worker_count.max(1);
        let mut hint = if (0..worker_count).contains(&config.scan_hint) {
            config.scan_hint
        } else {
            #[cfg(feature = "tracing")]
            tracing::warn!(
                scan_hint = config.scan_hint,
                worker_count,
                "scan hint out of range, clamping to 0"
            );
            0
        };

        while !self.cancel.is_cancelled() {
            let Some((worker_id, key)) = self.scan_for_slot(&backend, &config, hint) else {
                if self.cancel.is_cancelled() {
                    break;
                }
                std::thread::sleep(config.retry_backoff);
                continue;
            };

            self.publish(worker_id);
            // Remember this slot as the restart point: if it is later lost
            // (non-preserving), the next scan tries to reclaim it first
            // instead of round-robining past it.
            hint = worker_id;

            // Hold this slot until it is truly time to look for another one:
            // a non-preserving loss, or a stop request. A preserving loss
            // retries the same key in place, so the published worker id
            // never changes underneath a caller.
            loop {
                self.hold_until_lost(&backend, &config);
                if self.cancel.is_cancelled() {
                    let _ = backend.release(&key);
                    break;
                }
                if !config.preserve_on_loss {
                    self.unpublish();
                    let _ = backend.release(&key);
                    break;
                }
                let mut reacquired = false;
                while !self.cancel.is_cancelled() {
                    match backend.acquire(&key) {
                        Ok(AcquireOutcome::Acquired) => {
                            reacquired = true;
                            break;
                        }
                        _ => std::thread::sleep(config.retry_backoff),
                    }
                }
                if !reacquired {
                    let _ = backend.release(&key);
                    break;
                }
            }
        }

        if self.available.load(Ordering::Acquire) {
            let key = format!("{}/{}", config.key_prefix, self.worker_id.load(Ordering::Relaxed));
            let _ = backend.release(&key);
            self.unpublish();
        }
    }

    /// Scans `worker_count` candidate slots starting at `hint`, wrapping
    /// around, trying to acquire each in turn. Returns the first one
    /// acquired, or `None` if a full lap found nothing free (or a stop was
    /// requested mid-scan).
    fn scan_for_slot(
        &self,
        backend: &Arc<dyn LockBackend>,
        config: &LeasedProviderConfig,
        hint: i64,
    ) -> Option<(i64, String)> {
        let count = config.worker_count.max(1);
        for offset in 0..count {
            if self.cancel.is_cancelled() {
                return None;
            }
            let candidate = (hint + offset).rem_euclid(count);
            let key = format!("{}/{}", config.key_prefix, candidate);
            match backend.acquire(&key) {
                Ok(AcquireOutcome::Acquired) => return Some((candidate, key)),
                Ok(AcquireOutcome::Contended) => continue,
                Err(_) => continue,
            }
        }
        None
    }

    /// Renews the held lock until it is lost or a stop is requested. The
    /// backend ties renewal to the session rather than the key, mirroring
    /// Consul's session-scoped TTL renewal.
    fn hold_until_lost(&self, backend: &Arc<dyn LockBackend>, config: &LeasedProviderConfig) {
        loop {
            if self.cancel.is_cancelled() {
                return;
            }
            match backend.wait_for_loss(config.renew_interval) {
                Ok(true) => return,
                Ok(false) => {
                    if backend.renew().is_err() {
                        return;
                    }
                }
                Err(_) => return,
            }
        }
    }
}

impl WorkerIdProvider for LeasedProvider {
    fn get_worker_id(&self) -> Result<i64> {
        if self.available.load(Ordering::Acquire) {
            Ok(self.worker_id.load(Ordering::Relaxed))
        } else {
            Err(Error::ProviderUnavailable)
        }
    }
}

impl Drop for LeasedProvider {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::kv::fake::{InMemoryBackend, Shared};
    use std::time::Duration;

    fn wait_until<F: Fn() -> bool>(f: F, timeout: Duration) -> bool {
        let deadline = std::time::Instant::now() + timeout;
        while std::time::Instant::now() < deadline {
            if f() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        f()
    }

    fn fast_config() -> LeasedProviderConfig {
        LeasedProviderConfig {
            key_prefix: "test/workers".into(),
            worker_count: 4,
            scan_hint: 0,
            preserve_on_loss: false,
            renew_interval: Duration::from_millis(20),
            retry_backoff: Duration::from_millis(20),
        }
    }

    #[test]
    fn becomes_available_after_acquiring_a_slot() {
        let shared = Shared::new();
        let backend = Arc::new(InMemoryBackend::new(shared));
        let provider = LeasedProvider::spawn(backend, fast_config());

        assert!(wait_until(
            || provider.get_worker_id().is_ok(),
            Duration::from_secs(1)
        ));
        let worker = provider.get_worker_id().unwrap();
        assert!((0..4).contains(&worker));
        provider.stop();
    }

    #[test]
    fn two_providers_never_hold_the_same_slot() {
        let shared = Shared::new();
        let a = LeasedProvider::spawn(Arc::new(InMemoryBackend::new(shared.clone())), fast_config());
        let b = LeasedProvider::spawn(Arc::new(InMemoryBackend::new(shared)), fast_config());

        assert!(wait_until(
            || a.get_worker_id().is_ok() && b.get_worker_id().is_ok(),
            Duration::from_secs(1)
        ));
        assert_ne!(a.get_worker_id().unwrap(), b.get_worker_id().unwrap());
        a.stop();
        b.stop();
    }

    /// Wraps an [`InMemoryBackend`] and can be told to make every `acquire`
    /// report contention, regardless of the underlying map. Lets a test
    /// force a sustained reacquisition failure deterministically instead of
    /// racing the background thread after an expiry.
    struct FlakyBackend {
        inner: InMemoryBackend,
        block_acquire: Arc<std::sync::atomic::AtomicBool>,
    }

    impl LockBackend for FlakyBackend {
        fn acquire(&self, key: &str) -> Result<AcquireOutcome> {
            if self.block_acquire.load(std::sync::atomic::Ordering::Acquire) {
                return Ok(AcquireOutcome::Contended);
            }
            self.inner.acquire(key)
        }
        fn renew(&self) -> Result<()> {
            self.inner.renew()
        }
        fn release(&self, key: &str) -> Result<()> {
            self.inner.release(key)
        }
        fn wait_for_loss(&self, timeout: Duration) -> Result<bool> {
            self.inner.wait_for_loss(timeout)
        }
    }

    #[test]
    fn without_self_preservation_loss_makes_provider_unavailable() {
        let shared = Shared::new();
        let block_acquire = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let backend = Arc::new(FlakyBackend {
            inner: InMemoryBackend::new(shared.clone()),
            block_acquire: block_acquire.clone(),
        });
        let provider = LeasedProvider::spawn(backend, fast_config());
        assert!(wait_until(
            || provider.get_worker_id().is_ok(),
            Duration::from_secs(1)
        ));
        let worker = provider.get_worker_id().unwrap();

        // Block reacquisition before expiring the slot, so the loss handler
        // cannot silently grab a replacement before we observe the gap.
        block_acquire.store(true, std::sync::atomic::Ordering::Release);
        shared.expire(&format!("test/workers/{worker}"));

        assert!(wait_until(
            || provider.get_worker_id().is_err(),
            Duration::from_secs(1)
        ));

        block_acquire.store(false, std::sync::atomic::Ordering::Release);
        assert!(wait_until(
            || provider.get_worker_id().is_ok(),
            Duration::from_secs(1)
        ));
        provider.stop();
    }

    #[test]
    fn self_preservation_keeps_serving_the_stale_id_after_loss() {
        let shared = Shared::new();
        let mut config = fast_config();
        config.preserve_on_loss = true;
        let provider = LeasedProvider::spawn(Arc::new(InMemoryBackend::new(shared.clone())), config);
        assert!(wait_until(
            || provider.get_worker_id().is_ok(),
            Duration::from_secs(1)
        ));
        let worker = provider.get_worker_id().unwrap();
        shared.expire(&format!("test/workers/{worker}"));

        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(provider.get_worker_id().unwrap(), worker);
        provider.stop();
    }

    #[test]
    fn restart_after_loss_reclaims_its_former_slot_first() {
        // Worker 0 is acquired, then lost, while every other slot stays free.
        // The rescan must try slot 0 first and get it back, rather than
        // round-robining past it to slot 1.
        let shared = Shared::new();
        let provider = LeasedProvider::spawn(Arc::new(InMemoryBackend::new(shared.clone())), fast_config());
        assert!(wait_until(
            || provider.get_worker_id().is_ok(),
            Duration::from_secs(1)
        ));
        let worker = provider.get_worker_id().unwrap();
        assert_eq!(worker, 0);

        shared.expire(&format!("test/workers/{worker}"));

        assert!(wait_until(
            || provider.get_worker_id().ok() == Some(worker),
            Duration::from_secs(1)
        ));
        provider.stop();
    }

    #[test]
    fn stop_releases_the_slot_for_others() {
        let shared = Shared::new();
        let a = LeasedProvider::spawn(Arc::new(InMemoryBackend::new(shared.clone())), fast_config());
        assert!(wait_until(
            || a.get_worker_id().is_ok(),
            Duration::from_secs(1)
        ));
        let first_worker = a.get_worker_id().unwrap();
        a.stop();

        let b = LeasedProvider::spawn(Arc::new(InMemoryBackend::new(shared)), fast_config());
        assert!(wait_until(
            || b.get_worker_id().is_ok(),
            Duration::from_secs(1)
        ));
        assert_eq!(b.get_worker_id().unwrap(), first_worker);
        b.stop();
    }
}
