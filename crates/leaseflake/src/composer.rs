//! The Snowflake id composer: the synchronous, single-process core that
//! assembles `(timestamp, datacenter, worker, sequence)` into a packed id.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{Error, Result};
use crate::id::{self, EPOCH_MS, MAX_DATACENTER_ID, MAX_SEQUENCE, MAX_TIMESTAMP};
use crate::mutex::Mutex;
use crate::provider::WorkerIdProvider;
use crate::time::Clock;

/// How long `next_id` is willing to busy-wait for the clock to catch up to a
/// backwards jump before giving up and returning [`Error::ClockMovedBackwards`].
///
/// This bounds an otherwise-unbounded stall: NTP step adjustments are rare and
/// normally small, but nothing guarantees they stay small, so the composer
/// must not hang the calling thread indefinitely.
const MAX_BACKWARDS_WAIT: Duration = Duration::from_secs(2);

#[derive(Debug)]
struct ComposerState {
    last_ms: i64,
    sequence: i64,
}

/// Synchronously assembles Snowflake-style ids from the current time, a
/// worker id supplied by a [`WorkerIdProvider`], and a per-millisecond
/// sequence counter.
///
/// `next_id` is called under a single exclusive lock for its whole duration,
/// which is what makes ids strictly monotonic within one process. The lock
/// is held only across in-memory
/// arithmetic and the provider's non-blocking `get_worker_id` call, so
/// contention is expected to be extremely short-lived.
pub struct Composer {
    state: Mutex<ComposerState>,
    datacenter: i64,
    clock: Arc<dyn Clock>,
    provider: Arc<dyn WorkerIdProvider>,
}

impl Composer {
    /// Creates a new composer for the given `datacenter` id (`[0, 3]`),
    /// pulling worker ids from `provider` and wall-clock time from `clock`.
    ///
    /// # Errors
    /// Returns [`Error::OutOfRange`] if `datacenter` is outside `[0, 3]`.
    pub fn new(
        datacenter: i64,
        clock: Arc<dyn Clock>,
        provider: Arc<dyn WorkerIdProvider>,
    ) -> Result<Self> {
        if !(0..=MAX_DATACENTER_ID).contains(&datacenter) {
            return Err(Error::OutOfRange {
                field: "datacenter",
                value: datacenter,
                max: MAX_DATACENTER_ID,
            });
        }
        Ok(Self {
            state: Mutex::new(ComposerState {
                last_ms: 0,
                sequence: 0,
            }),
            datacenter,
            clock,
            provider,
        })
    }

    /// Produces the next id, blocking (briefly, and only in the sequence-wrap
    /// or clock-regression cases) until one is available.
    ///
    /// # Errors
    /// - [`Error::EpochExhausted`] if the 41-bit timestamp field has
    ///   overflowed.
    /// - [`Error::ClockMovedBackwards`] if the wall clock regressed further
    ///   than [`MAX_BACKWARDS_WAIT`] allows catching up to.
    /// - Whatever [`WorkerIdProvider::get_worker_id`] returns, propagated
    ///   unchanged.
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "trace", skip(self)))]
    pub fn next_id(&self) -> Result<i64> {
        #[cfg(feature = "parking-lot")]
        let mut state = self.state.lock();
        #[cfg(not(feature = "parking-lot"))]
        let mut state = self.state.lock().expect("composer mutex poisoned");

        let mut now = self.clock.now_millis();

        if now < state.last_ms {
            now = self.wait_for_clock_to_catch_up(state.last_ms)?;
        }

        if now == state.last_ms {
            state.sequence = (state.sequence + 1) & MAX_SEQUENCE;
            if state.sequence == 0 {
                // Sequence space for this millisecond is exhausted; busy-wait
                // for the next one.
                now = self.wait_for_next_millisecond(state.last_ms);
            }
        } else {
            state.sequence = 0;
        }

        let t = now - EPOCH_MS;
        if t > MAX_TIMESTAMP {
            return Err(Error::EpochExhausted);
        }

        state.last_ms = now;
        let sequence = state.sequence;
        // Drop the lock before calling into the provider: the provider is a
        // non-blocking atomic read, but there is no reason to hold the
        // composer's lock across a call into another component.
        drop(state);

        let worker = self.provider.get_worker_id()?;

        Ok(id::pack(t, self.datacenter, worker, sequence))
    }

    /// Busy-waits until the clock reaches at least `target`, re-reading it in
    /// a tight loop. Returns the clock value once it catches up.
    fn wait_for_clock_to_catch_up(&self, target: i64) -> Result<i64> {
        let deadline = Instant::now() + MAX_BACKWARDS_WAIT;
        loop {
            let now = self.clock.now_millis();
            if now >= target {
                return Ok(now);
            }
            if Instant::now() >= deadline {
                return Err(Error::ClockMovedBackwards);
            }
            std::hint::spin_loop();
        }
    }

    /// Busy-waits until the clock strictly exceeds `last_ms`.
    fn wait_for_next_millisecond(&self, last_ms: i64) -> i64 {
        loop {
            let now = self.clock.now_millis();
            if now > last_ms {
                return now;
            }
            std::hint::spin_loop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::StaticProvider;
    use crate::time::FrozenClock;
    use std::collections::HashSet;

    fn composer_with(clock: FrozenClock, worker: i64) -> Composer {
        Composer::new(
            0,
            Arc::new(clock),
            Arc::new(StaticProvider::new(worker).unwrap()),
        )
        .unwrap()
    }

    #[test]
    fn rejects_out_of_range_datacenter() {
        let clock = FrozenClock::new(EPOCH_MS);
        let err = Composer::new(4, Arc::new(clock), Arc::new(StaticProvider::new(0).unwrap()));
        assert!(matches!(err, Err(Error::OutOfRange { field: "datacenter", .. })));
    }

    #[test]
    fn ids_are_positive_and_well_formed() {
        let clock = FrozenClock::new(EPOCH_MS + 1000);
        let composer = composer_with(clock, 7);
        let id = composer.next_id().unwrap();
        assert!(id > 0);
        let fields = id::unpack(id);
        assert_eq!(fields.worker, 7);
        assert_eq!(fields.datacenter, 0);
        assert_eq!(fields.sequence, 0);
        assert_eq!(fields.timestamp, 1000);
    }

    #[test]
    fn s1_static_single_id_three_calls() {
        let clock = FrozenClock::new(EPOCH_MS + 42);
        let composer = composer_with(clock, 7);
        let ids: Vec<i64> = (0..3).map(|_| composer.next_id().unwrap()).collect();
        for w in ids.windows(2) {
            assert!(w[0] < w[1], "ids must be strictly increasing");
        }
        for id in &ids {
            let fields = id::unpack(*id);
            assert_eq!(fields.worker, 7);
            assert_eq!(fields.datacenter, 0);
            assert!(*id > 0);
        }
        let first = id::unpack(ids[0]);
        let second = id::unpack(ids[1]);
        assert_eq!(first.timestamp, second.timestamp);
        assert_eq!(second.sequence, first.sequence + 1);
    }

    #[test]
    fn s2_sequence_exhaustion_wraps_to_next_millisecond() {
        let clock = FrozenClock::new(EPOCH_MS + 500);
        let composer = composer_with(clock.clone(), 0);

        // Advance the clock by one millisecond after the 4096th call so the
        // busy-wait for the next millisecond terminates immediately instead
        // of spinning forever in a unit test.
        let advancer_clock = clock.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            advancer_clock.advance(1);
        });

        let mut ids = Vec::with_capacity(5000);
        for _ in 0..5000 {
            ids.push(composer.next_id().unwrap());
        }
        handle.join().unwrap();

        let same_ms: Vec<_> = ids
            .iter()
            .map(|id| id::unpack(*id))
            .filter(|f| f.timestamp == 500)
            .collect();
        assert_eq!(same_ms.len(), 4096);
        let mut sequences: Vec<i64> = same_ms.iter().map(|f| f.sequence).collect();
        sequences.sort_unstable();
        assert_eq!(sequences, (0..4096).collect::<Vec<_>>());

        let later: Vec<_> = ids
            .iter()
            .map(|id| id::unpack(*id))
            .filter(|f| f.timestamp > 500)
            .collect();
        assert_eq!(later.len(), 904);
        assert_eq!(later[0].sequence, 0);
    }

    #[test]
    fn sequence_resets_across_millisecond_boundary() {
        let clock = FrozenClock::new(EPOCH_MS);
        let composer = composer_with(clock.clone(), 0);
        let first = composer.next_id().unwrap();
        clock.advance(1);
        let second = composer.next_id().unwrap();
        let f1 = id::unpack(first);
        let f2 = id::unpack(second);
        assert_ne!(f1.timestamp, f2.timestamp);
        assert_eq!(f2.sequence, 0);
    }

    #[test]
    fn small_backwards_jump_waits_and_succeeds() {
        let clock = FrozenClock::new(EPOCH_MS + 100);
        let composer = composer_with(clock.clone(), 0);
        let first = composer.next_id().unwrap();

        clock.set(EPOCH_MS + 99);
        let jump_clock = clock.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            jump_clock.set(EPOCH_MS + 100);
        });
        let second = composer.next_id().unwrap();
        assert!(second > first);
    }

    #[test]
    fn ids_do_not_collide_across_repeated_calls() {
        let clock = FrozenClock::new(EPOCH_MS);
        let composer = composer_with(clock.clone(), 1);
        let mut seen = HashSet::new();
        for i in 0..10_000 {
            if i % 37 == 0 {
                clock.advance(1);
            }
            let id = composer.next_id().unwrap();
            assert!(seen.insert(id), "duplicate id generated: {id}");
        }
    }
}
