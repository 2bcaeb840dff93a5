//! Common utilities and types shared across stampede

pub mod config;
pub mod error;
pub mod metrics;
pub mod rng;
pub mod tracing_middleware;

pub use config::{Config, RedisConfig, StoreBackend};
pub use error::{Error, Result};
pub use metrics::METRICS;
pub use rng::SharedRng;
