//! Configuration for stampede
//!
//! Loaded once at startup (file, then `STAMPEDE__*` environment variables,
//! then CLI overrides applied by the binary), validated, and shared read-only
//! afterwards.

use crate::common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Global configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Lower bound of the cache TTL jitter, in seconds
    #[serde(default = "default_min_timeout")]
    pub min_timeout: u64,

    /// Upper bound of the cache TTL jitter, in seconds (inclusive)
    #[serde(default = "default_max_timeout")]
    pub max_timeout: u64,

    /// Lookups dispatched per inbound stream request
    #[serde(default = "default_number_of_requests")]
    pub number_of_requests: usize,

    /// Keyspace the random lookups draw from
    #[serde(default)]
    pub urls: Vec<String>,

    /// Fixed sleep between checks while another coordinator holds a claim
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Bind address for the HTTP front
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,

    /// Shared store backend
    #[serde(default)]
    pub store: StoreBackend,

    /// Redis connection settings (used when `store = "redis"`)
    #[serde(default)]
    pub redis: RedisConfig,

    /// Timeout for a single origin fetch, in seconds
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_min_timeout() -> u64 {
    5
}
fn default_max_timeout() -> u64 {
    10
}
fn default_number_of_requests() -> usize {
    10
}
fn default_retry_backoff_ms() -> u64 {
    5
}
fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 5300))
}
fn default_fetch_timeout() -> u64 {
    10
}
fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    #[default]
    Redis,
}

impl std::str::FromStr for StoreBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "memory" | "mem" => Ok(StoreBackend::Memory),
            "redis" => Ok(StoreBackend::Redis),
            other => Err(Error::InvalidConfig(format!("unknown store backend: {}", other))),
        }
    }
}

/// Redis connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    #[serde(default = "default_redis_host")]
    pub host: String,

    #[serde(default = "default_redis_port")]
    pub port: u16,

    #[serde(default)]
    pub password: String,

    #[serde(default)]
    pub db: i64,

    /// Prefix for claim keys
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Lifetime of an in-flight claim; bounds how long a crashed claimant can block a key
    #[serde(default = "default_claim_lease")]
    pub claim_lease_secs: u64,

    /// Upper bound on a single store round trip before the store counts as down
    #[serde(default = "default_response_timeout_ms")]
    pub response_timeout_ms: u64,
}

fn default_redis_host() -> String {
    "127.0.0.1".to_string()
}
fn default_redis_port() -> u16 {
    6379
}
fn default_namespace() -> String {
    "stampede".to_string()
}
fn default_claim_lease() -> u64 {
    30
}
fn default_response_timeout_ms() -> u64 {
    2000
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: default_redis_host(),
            port: default_redis_port(),
            password: String::new(),
            db: 0,
            namespace: default_namespace(),
            claim_lease_secs: default_claim_lease(),
            response_timeout_ms: default_response_timeout_ms(),
        }
    }
}

impl RedisConfig {
    /// Connection URL understood by `redis::Client::open`
    pub fn url(&self) -> String {
        if self.password.is_empty() {
            format!("redis://{}:{}/{}", self.host, self.port, self.db)
        } else {
            format!(
                "redis://:{}@{}:{}/{}",
                self.password, self.host, self.port, self.db
            )
        }
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            min_timeout: default_min_timeout(),
            max_timeout: default_max_timeout(),
            number_of_requests: default_number_of_requests(),
            urls: Vec::new(),
            retry_backoff_ms: default_retry_backoff_ms(),
            bind_addr: default_bind_addr(),
            store: StoreBackend::default(),
            redis: RedisConfig::default(),
            fetch_timeout_secs: default_fetch_timeout(),
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from `path` (or `./config.{toml,yaml}` when absent),
    /// layered under `STAMPEDE__*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        builder = match path {
            Some(path) => builder.add_source(config::File::from(path)),
            None => builder.add_source(config::File::with_name("config").required(false)),
        };
        builder = builder.add_source(
            config::Environment::with_prefix("STAMPEDE")
                .prefix_separator("__")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("urls")
                .try_parsing(true),
        );

        let config: Config = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Check the invariants the coordinator relies on
    pub fn validate(&self) -> Result<()> {
        if self.min_timeout == 0 {
            return Err(Error::InvalidConfig("min_timeout must be at least 1 second".into()));
        }
        if self.max_timeout < self.min_timeout {
            return Err(Error::InvalidConfig(format!(
                "max_timeout ({}) must be >= min_timeout ({})",
                self.max_timeout, self.min_timeout
            )));
        }
        if self.number_of_requests == 0 {
            return Err(Error::InvalidConfig("number_of_requests must be > 0".into()));
        }
        if self.urls.is_empty() {
            return Err(Error::InvalidConfig("urls must not be empty".into()));
        }
        if self.urls.iter().any(|u| u.trim().is_empty()) {
            return Err(Error::InvalidConfig("urls must not contain empty entries".into()));
        }
        if !(1..=1000).contains(&self.retry_backoff_ms) {
            return Err(Error::InvalidConfig(
                "retry_backoff_ms must be between 1 and 1000".into(),
            ));
        }
        if self.fetch_timeout_secs == 0 {
            return Err(Error::InvalidConfig("fetch_timeout_secs must be > 0".into()));
        }
        if self.store == StoreBackend::Redis {
            // A lease that can lapse mid-fetch lets a second coordinator in.
            if self.redis.claim_lease_secs <= self.fetch_timeout_secs {
                return Err(Error::InvalidConfig(format!(
                    "redis.claim_lease_secs ({}) must exceed fetch_timeout_secs ({})",
                    self.redis.claim_lease_secs, self.fetch_timeout_secs
                )));
            }
            if self.redis.response_timeout_ms == 0 {
                return Err(Error::InvalidConfig(
                    "redis.response_timeout_ms must be > 0".into(),
                ));
            }
        }
        Ok(())
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}
