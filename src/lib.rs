//! # stampede
//!
//! A lookup service that answers many concurrent "fetch data for key K"
//! requests while running at most one origin fetch per key at a time:
//! - Shared TTL cache (Redis or in-process) as the single source of truth
//! - Per-key in-flight claims taken with the store's atomic primitives
//! - Randomized TTL jitter so keys fetched together do not expire together
//! - Streaming fan-out of N random lookups per inbound request
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────┐
//! │  Service front (HTTP/NDJSON) │
//! └──────────────┬───────────────┘
//!                │ handle(n)
//! ┌──────────────▼───────────────┐
//! │           FanOut             │  n concurrent lookups, completion order
//! └──────────────┬───────────────┘
//!        ┌───────┴────────┐ resolve(key)
//! ┌──────▼──────┐  ┌──────▼──────┐
//! │ Coordinator │  │ Coordinator │  check cache → claim → fetch → set → release
//! └──┬───────┬──┘  └──┬───────┬──┘
//!    │       │        │       │
//! ┌──▼───┐ ┌─▼──────┐ │       │
//! │Store │ │Fetcher │◄┘       │
//! └──────┘ └────────┘◄────────┘
//! ```
//!
//! ## Usage
//!
//! ### Start a server
//! ```bash
//! stampede-server serve --config config.toml --bind 0.0.0.0:5300
//! ```
//!
//! ### Consume streams
//! ```bash
//! stampede stream --server http://localhost:5300 --streams 100
//! stampede resolve https://example.com
//! ```

pub mod common;
pub mod coordinator;
pub mod fetcher;
pub mod store;

// Re-export commonly used types
pub use common::{Config, Error, Result};
pub use coordinator::{FanOut, Provenance, Resolved, Server, StampedeCoordinator};
pub use fetcher::{Fetcher, HttpFetcher};
pub use store::{MemoryStore, RedisStore, SharedStore};

/// Current version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build info
pub const BUILD_INFO: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("CARGO_PKG_NAME"), ")");
