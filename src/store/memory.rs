//! In-process shared store
//!
//! Suitable when a single server process owns the keyspace, and for tests.
//! Expiry is lazy: an expired entry is treated as absent on read and may be
//! overwritten by `set_if_absent`. `purge_expired` reclaims the memory.

use crate::common::{Error, Result};
use crate::store::SharedStore;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    claims: HashSet<String>,
}

/// Mutex-guarded map of expiring entries plus a set of claimed keys
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| Error::StoreUnavailable("memory store lock poisoned".into()))
    }

    /// Number of live (unexpired) entries
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.lock()
            .map(|inner| inner.entries.values().filter(|e| e.is_live(now)).count())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remaining lifetime of `key`, `None` if absent or expired
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        let inner = self.lock().ok()?;
        inner
            .entries
            .get(key)
            .filter(|e| e.is_live(now))
            .map(|e| e.expires_at - now)
    }

    pub fn is_claimed(&self, key: &str) -> bool {
        self.lock()
            .map(|inner| inner.claims.contains(key))
            .unwrap_or(false)
    }

    /// Drop expired entries, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        match self.lock() {
            Ok(mut inner) => {
                let before = inner.entries.len();
                inner.entries.retain(|_, e| e.is_live(now));
                before - inner.entries.len()
            }
            Err(_) => 0,
        }
    }

    /// Periodically purge expired entries until the returned handle is aborted
    pub fn spawn_purger(self: Arc<Self>, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                let purged = self.purge_expired();
                if purged > 0 {
                    tracing::debug!(purged, "Purged expired cache entries");
                }
            }
        })
    }
}

#[async_trait]
impl SharedStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let now = Instant::now();
        let inner = self.lock()?;
        Ok(inner
            .entries
            .get(key)
            .filter(|e| e.is_live(now))
            .map(|e| e.value.clone()))
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let now = Instant::now();
        let mut inner = self.lock()?;
        if inner.entries.get(key).is_some_and(|e| e.is_live(now)) {
            return Ok(false);
        }
        inner.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: now + ttl,
            },
        );
        Ok(true)
    }

    async fn try_claim(&self, key: &str) -> Result<bool> {
        Ok(self.lock()?.claims.insert(key.to_string()))
    }

    async fn release(&self, key: &str) -> Result<()> {
        self.lock()?.claims.remove(key);
        Ok(())
    }
}
