//! Test doubles shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use stampede::common::{Config, Error, Result};
use stampede::{Fetcher, MemoryStore, SharedStore};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Counts fetches per key and flags any overlapping fetch of the same key.
#[derive(Default)]
pub struct RecordingFetcher {
    delay: Duration,
    slow_keys: HashMap<String, Duration>,
    calls: Mutex<Vec<String>>,
    in_progress: Mutex<HashSet<String>>,
    overlaps: AtomicUsize,
}

impl RecordingFetcher {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            ..Default::default()
        }
    }

    /// Per-key delay overriding the default one
    pub fn with_key_delay(mut self, key: &str, delay: Duration) -> Self {
        self.slow_keys.insert(key.to_string(), delay);
        self
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls_for(&self, key: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|k| *k == key).count()
    }

    pub fn overlaps(&self) -> usize {
        self.overlaps.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for RecordingFetcher {
    async fn fetch(&self, key: &str) -> String {
        if !self.in_progress.lock().unwrap().insert(key.to_string()) {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        self.calls.lock().unwrap().push(key.to_string());

        let delay = self.slow_keys.get(key).copied().unwrap_or(self.delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        self.in_progress.lock().unwrap().remove(key);
        format!("fetched:{}", key)
    }
}

/// Wraps a `MemoryStore` and records every TTL passed to `set_if_absent`.
#[derive(Default)]
pub struct TtlRecordingStore {
    pub inner: MemoryStore,
    pub ttls: Mutex<Vec<Duration>>,
}

#[async_trait]
impl SharedStore for TtlRecordingStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.inner.get(key).await
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        self.ttls.lock().unwrap().push(ttl);
        self.inner.set_if_absent(key, value, ttl).await
    }

    async fn try_claim(&self, key: &str) -> Result<bool> {
        self.inner.try_claim(key).await
    }

    async fn release(&self, key: &str) -> Result<()> {
        self.inner.release(key).await
    }
}

/// A store that has gone away
pub struct DownStore;

#[async_trait]
impl SharedStore for DownStore {
    async fn get(&self, _key: &str) -> Result<Option<String>> {
        Err(Error::StoreUnavailable("connection refused".into()))
    }

    async fn set_if_absent(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<bool> {
        Err(Error::StoreUnavailable("connection refused".into()))
    }

    async fn try_claim(&self, _key: &str) -> Result<bool> {
        Err(Error::StoreUnavailable("connection refused".into()))
    }

    async fn release(&self, _key: &str) -> Result<()> {
        Err(Error::StoreUnavailable("connection refused".into()))
    }
}

pub fn config(keys: &[&str], min_timeout: u64, max_timeout: u64) -> Config {
    Config {
        min_timeout,
        max_timeout,
        retry_backoff_ms: 1,
        number_of_requests: 10,
        urls: keys.iter().map(|k| k.to_string()).collect(),
        ..Default::default()
    }
}

pub fn memory_store() -> Arc<MemoryStore> {
    Arc::new(MemoryStore::new())
}
