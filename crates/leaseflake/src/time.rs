//! Time sources for the ID composer.
//!
//! The composer never calls [`std::time::SystemTime`] directly. Instead it
//! goes through a [`Clock`], which lets tests freeze or advance time without
//! touching the real wall clock. [`SystemClock`] is the production
//! implementation; [`FrozenClock`] is used by composer tests that need exact
//! control over millisecond boundaries.

use std::time::{SystemTime, UNIX_EPOCH};

/// A source of wall-clock milliseconds since the Unix epoch.
///
/// Implementations must be monotonic-ish in practice (backwards jumps are
/// tolerated by the composer, not by this trait), cheap to call, and safe to
/// share across threads.
pub trait Clock: Send + Sync {
    /// Returns the current time in milliseconds since 1970-01-01T00:00:00Z.
    fn now_millis(&self) -> i64;
}

/// The production [`Clock`], backed by [`SystemTime::now`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before UNIX_EPOCH")
            .as_millis() as i64
    }
}

/// A [`Clock`] test double that returns a fixed or externally advanced value.
///
/// Cloning shares the same underlying counter, so advancing one handle is
/// visible through every clone - useful for driving a composer from a test
/// while holding a second handle to assert on elapsed time.
#[derive(Debug, Clone)]
pub struct FrozenClock {
    millis: std::sync::Arc<portable_atomic::AtomicI64>,
}

impl FrozenClock {
    /// Creates a clock frozen at `millis`.
    pub fn new(millis: i64) -> Self {
        Self {
            millis: std::sync::Arc::new(portable_atomic::AtomicI64::new(millis)),
        }
    }

    /// Advances the clock by `delta` milliseconds (may be negative to
    /// simulate a backwards jump).
    pub fn advance(&self, delta: i64) {
        self.millis
            .fetch_add(delta, portable_atomic::Ordering::SeqCst);
    }

    /// Sets the clock to an absolute value.
    pub fn set(&self, millis: i64) {
        self.millis.store(millis, portable_atomic::Ordering::SeqCst);
    }
}

impl Clock for FrozenClock {
    fn now_millis(&self) -> i64 {
        self.millis.load(portable_atomic::Ordering::SeqCst)
    }
}
