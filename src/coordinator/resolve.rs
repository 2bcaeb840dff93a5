//! Stampede-safe single-key lookup
//!
//! `resolve(key)`:
//! 1. read the key; a hit returns immediately
//! 2. try to claim the key in the shared store
//! 3. claim lost: sleep a fixed backoff and start over from 1
//! 4. claim won: re-read (the previous claimant may have just written),
//!    otherwise fetch, `set_if_absent` with a jittered TTL, release
//!
//! The claimed section runs in its own task, so dropping a `resolve` future
//! never strands a claim.

use crate::common::{Config, Error, Result, SharedRng, METRICS};
use crate::fetcher::Fetcher;
use crate::store::SharedStore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Where a resolved value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Provenance {
    CacheHit,
    OriginFetch,
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provenance::CacheHit => f.write_str("cache-hit"),
            Provenance::OriginFetch => f.write_str("origin-fetch"),
        }
    }
}

/// One answered lookup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolved {
    pub key: String,
    pub value: String,
    pub provenance: Provenance,
}

pub struct StampedeCoordinator {
    store: Arc<dyn SharedStore>,
    fetcher: Arc<dyn Fetcher>,
    rng: Arc<SharedRng>,
    min_timeout: u64,
    max_timeout: u64,
    backoff: Duration,
}

impl StampedeCoordinator {
    pub fn new(config: &Config, store: Arc<dyn SharedStore>, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            store,
            fetcher,
            rng: Arc::new(SharedRng::new()),
            min_timeout: config.min_timeout,
            max_timeout: config.max_timeout,
            backoff: config.retry_backoff(),
        }
    }

    /// Replace the random source (key picks and TTL jitter)
    pub fn with_rng(mut self, rng: Arc<SharedRng>) -> Self {
        self.rng = rng;
        self
    }

    pub fn rng(&self) -> &Arc<SharedRng> {
        &self.rng
    }

    /// Look up `key`, fetching it from the origin at most once across all
    /// concurrent callers.
    ///
    /// Only store failures come back as `Err`; they are meant to be fatal.
    pub async fn resolve(&self, key: &str) -> Result<Resolved> {
        let start = Instant::now();
        let mut conflicts = 0u64;

        let (value, provenance) = loop {
            if let Some(value) = self.store.get(key).await.inspect_err(store_failed)? {
                break (value, Provenance::CacheHit);
            }

            if self.store.try_claim(key).await.inspect_err(store_failed)? {
                break self.run_claimed(key).await?;
            }

            conflicts += 1;
            METRICS.claim_conflicts.inc();
            tokio::time::sleep(self.backoff).await;
        };

        if provenance == Provenance::CacheHit {
            METRICS.cache_hits.inc();
        }
        METRICS.record_resolve(start.elapsed());
        tracing::debug!(key, %provenance, conflicts, "Resolved");

        Ok(Resolved {
            key: key.to_string(),
            value,
            provenance,
        })
    }

    /// Run the claimed section to completion on its own task.
    async fn run_claimed(&self, key: &str) -> Result<(String, Provenance)> {
        let store = self.store.clone();
        let fetcher = self.fetcher.clone();
        let ttl = self.rng.ttl(self.min_timeout, self.max_timeout);
        let owned_key = key.to_string();

        let handle = tokio::spawn(async move {
            METRICS.in_flight.inc();
            let outcome = fill(&*store, &*fetcher, &owned_key, ttl).await;
            // Released whatever happened above
            let released = store.release(&owned_key).await;
            METRICS.in_flight.dec();

            let outcome = outcome.inspect_err(store_failed)?;
            released.inspect_err(store_failed)?;
            Ok::<_, Error>(outcome)
        });

        match handle.await {
            Ok(result) => result,
            Err(e) => {
                // A panicking fetcher, or runtime shutdown before the task ran.
                // Either way the key is still claimed by us.
                if e.is_panic() {
                    METRICS.in_flight.dec();
                }
                self.store.release(key).await.inspect_err(store_failed)?;
                Err(Error::Internal(format!("fetch task for {} failed: {}", key, e)))
            }
        }
    }
}

/// Body of the claimed section: re-check, fetch, write.
async fn fill(
    store: &dyn SharedStore,
    fetcher: &dyn Fetcher,
    key: &str,
    ttl: Duration,
) -> Result<(String, Provenance)> {
    if let Some(value) = store.get(key).await? {
        return Ok((value, Provenance::CacheHit));
    }

    let value = fetcher.fetch(key).await;
    METRICS.origin_fetches.inc();

    if store.set_if_absent(key, &value, ttl).await? {
        tracing::info!(key, ttl_secs = ttl.as_secs(), "Cached origin result");
    } else {
        METRICS.lost_writes.inc();
        tracing::warn!(key, "Cache entry appeared while fetching; kept the existing one");
    }

    Ok((value, Provenance::OriginFetch))
}

fn store_failed(e: &Error) {
    METRICS.store_errors.inc();
    tracing::error!(error = %e, "Shared store operation failed");
}
