//! Shared pseudo-random source for key selection and TTL jitter

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Mutex;
use std::time::Duration;

/// A `StdRng` behind a mutex, safe to share across lookup tasks.
///
/// Seed it with [`SharedRng::with_seed`] to make key picks reproducible.
#[derive(Debug)]
pub struct SharedRng {
    inner: Mutex<StdRng>,
}

impl SharedRng {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(StdRng::from_entropy()),
        }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self {
            inner: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Uniformly pick one key. Returns `None` for an empty keyspace.
    pub fn pick<'a>(&self, keys: &'a [String]) -> Option<&'a str> {
        if keys.is_empty() {
            return None;
        }
        let idx = self.lock().gen_range(0..keys.len());
        Some(keys[idx].as_str())
    }

    /// Whole-second TTL drawn uniformly from `[min_secs, max_secs]`.
    pub fn ttl(&self, min_secs: u64, max_secs: u64) -> Duration {
        let (lo, hi) = if min_secs <= max_secs {
            (min_secs, max_secs)
        } else {
            (max_secs, min_secs)
        };
        Duration::from_secs(self.lock().gen_range(lo..=hi))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StdRng> {
        // A poisoned rng is still a valid rng.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for SharedRng {
    fn default() -> Self {
        Self::new()
    }
}
