//! Concurrent fan-out of random lookups
//!
//! One inbound request becomes `n` independent `resolve` calls, each on a key
//! picked uniformly from the keyspace. Results are forwarded as they complete.

use crate::common::{Error, Result, SharedRng, METRICS};
use crate::coordinator::resolve::{Resolved, StampedeCoordinator};
use std::sync::Arc;
use tokio::sync::mpsc;

pub struct FanOut {
    coordinator: Arc<StampedeCoordinator>,
    keys: Arc<[String]>,
    rng: Arc<SharedRng>,
}

impl FanOut {
    /// Key picks share the coordinator's random source.
    pub fn new(coordinator: Arc<StampedeCoordinator>, keys: Vec<String>) -> Self {
        let rng = coordinator.rng().clone();
        Self {
            coordinator,
            keys: keys.into(),
            rng,
        }
    }

    pub fn coordinator(&self) -> &Arc<StampedeCoordinator> {
        &self.coordinator
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.iter().any(|k| k == key)
    }

    /// Dispatch `n` lookups and forward each result to `out` in completion order.
    ///
    /// Fails with [`Error::Transport`] as soon as `out` is closed; lookups
    /// already dispatched keep running and their results are dropped. A store
    /// failure in any lookup ends the batch with that error.
    pub async fn handle(&self, n: usize, out: mpsc::Sender<Resolved>) -> Result<()> {
        if self.keys.is_empty() {
            return Err(Error::InvalidConfig("keyspace is empty".into()));
        }
        METRICS.fanout_batches.inc();

        // Pick every key up front so TTL draws in early lookups cannot
        // interleave with the picks of a seeded source.
        let picks = (0..n)
            .map(|_| {
                self.rng
                    .pick(&self.keys)
                    .map(str::to_string)
                    .ok_or_else(|| Error::InvalidConfig("keyspace is empty".into()))
            })
            .collect::<Result<Vec<_>>>()?;

        let (done_tx, mut done_rx) = mpsc::channel::<Result<Resolved>>(n.max(1));
        for key in picks {
            let coordinator = self.coordinator.clone();
            let done_tx = done_tx.clone();
            tokio::spawn(async move {
                let result = coordinator.resolve(&key).await;
                // The batch may have been abandoned; nobody is listening then.
                let _ = done_tx.send(result).await;
            });
        }
        drop(done_tx);

        for _ in 0..n {
            let resolved = done_rx
                .recv()
                .await
                .ok_or_else(|| Error::Internal("lookup task ended without a result".into()))??;

            if out.send(resolved).await.is_err() {
                METRICS.transport_failures.inc();
                return Err(Error::Transport("output stream closed".into()));
            }
        }

        Ok(())
    }

    /// Run a batch of `n` lookups and gather the results in completion order.
    pub async fn collect(&self, n: usize) -> Result<Vec<Resolved>> {
        let (tx, mut rx) = mpsc::channel(n.max(1));
        let gather = async move {
            let mut results = Vec::with_capacity(n);
            while let Some(resolved) = rx.recv().await {
                results.push(resolved);
            }
            results
        };

        let (outcome, results) = tokio::join!(self.handle(n, tx), gather);
        outcome?;
        Ok(results)
    }
}
