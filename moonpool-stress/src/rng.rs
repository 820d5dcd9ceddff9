//! Seeded random number generation shared across run threads.
//!
//! Node threads, the broker and the queues all draw from [`SimRng`]
//! instances. Each consumer gets its own stream derived from the run seed so
//! that adding draws in one place does not shift the sequence of another.

use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Stream of the fault oracle.
pub(crate) const ORACLE_STREAM: u64 = 0x6f72_6163_6c65;
/// Stream of the message queue.
pub(crate) const QUEUE_STREAM: u64 = 0x7175_6575_65;
/// Stream of partition and recovery sampling.
pub(crate) const CHAOS_STREAM: u64 = 0x6368_616f_73;

/// Derive the seed of a named stream from a run seed.
pub(crate) fn stream_seed(seed: u64, stream: u64) -> u64 {
    // splitmix64 finalizer
    let mut z = seed ^ stream.wrapping_mul(0x9e37_79b9_7f4a_7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

/// Cloneable handle to a seeded ChaCha8 generator.
///
/// Clones share the same underlying state.
#[derive(Debug, Clone)]
pub struct SimRng {
    inner: Arc<Mutex<ChaCha8Rng>>,
}

impl SimRng {
    /// Create a generator from a seed.
    pub fn new(seed: u64) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ChaCha8Rng::seed_from_u64(seed))),
        }
    }

    /// Restart the sequence from a new seed. Visible through every clone.
    pub fn reseed(&self, seed: u64) {
        *self.inner.lock() = ChaCha8Rng::seed_from_u64(seed);
    }

    /// Uniform value in `[0, 1)`.
    pub fn random_ratio(&self) -> f64 {
        self.inner.lock().random::<f64>()
    }

    /// Returns `true` with probability `p`. Values outside `[0, 1]` saturate.
    pub fn random_bool(&self, p: f64) -> bool {
        self.random_ratio() < p
    }

    /// Uniform value in `range`, or `range.start` when the range is empty.
    pub fn random_range(&self, range: Range<usize>) -> usize {
        if range.start >= range.end {
            range.start
        } else {
            self.inner.lock().random_range(range)
        }
    }

    /// Uniform duration in `range`, or `range.start` when the range is empty.
    pub fn random_duration(&self, range: Range<Duration>) -> Duration {
        if range.start >= range.end {
            return range.start;
        }
        let start = range.start.as_nanos() as u64;
        let end = range.end.as_nanos() as u64;
        Duration::from_nanos(self.inner.lock().random_range(start..end))
    }

    /// Shuffle a slice in place.
    pub fn shuffle<T>(&self, items: &mut [T]) {
        items.shuffle(&mut *self.inner.lock());
    }
}
