//! Server bootstrap

use crate::common::{Config, Error, Result, StoreBackend};
use crate::coordinator::fanout::FanOut;
use crate::coordinator::http::{create_router, AppState};
use crate::coordinator::resolve::StampedeCoordinator;
use crate::fetcher::HttpFetcher;
use crate::store::{MemoryStore, RedisStore, SharedStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

pub struct Server {
    config: Arc<Config>,
}

impl Server {
    /// Validates `config` up front; nothing is started until [`Server::serve`].
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    async fn open_store(&self) -> Result<Arc<dyn SharedStore>> {
        match self.config.store {
            StoreBackend::Memory => {
                let store = Arc::new(MemoryStore::new());
                let every = Duration::from_secs(self.config.max_timeout.max(1));
                let _purger = store.clone().spawn_purger(every);
                Ok(store)
            }
            StoreBackend::Redis => Ok(Arc::new(RedisStore::connect(&self.config.redis).await?)),
        }
    }

    /// Run until ctrl-c, or until a lookup reports a store failure.
    pub async fn serve(self) -> Result<()> {
        tracing::info!("Starting stampede server");
        tracing::info!("  HTTP API: {}", self.config.bind_addr);
        tracing::info!("  Store: {:?}", self.config.store);
        tracing::info!(
            "  TTL: {}-{}s, {} lookups per stream, {} keys",
            self.config.min_timeout,
            self.config.max_timeout,
            self.config.number_of_requests,
            self.config.urls.len()
        );

        let store = self.open_store().await?;
        let fetcher = Arc::new(HttpFetcher::new(self.config.fetch_timeout())?);
        let coordinator = Arc::new(StampedeCoordinator::new(&self.config, store, fetcher));
        let fan_out = Arc::new(FanOut::new(coordinator, self.config.urls.clone()));

        let (fatal_tx, mut fatal_rx) = mpsc::unbounded_channel::<Error>();
        let router = create_router(AppState {
            fan_out,
            number_of_requests: self.config.number_of_requests,
            fatal: fatal_tx,
        });

        let listener = tokio::net::TcpListener::bind(self.config.bind_addr).await?;
        let http_server = async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(shutdown_signal())
                .await
        };

        tracing::info!("✓ Server ready");

        tokio::select! {
            res = http_server => {
                res?;
                tracing::info!("Server stopped");
                Ok(())
            }
            Some(err) = fatal_rx.recv() => {
                tracing::error!(error = %err, "Shared store failed; shutting down");
                Err(err)
            }
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}
