//! Stampede coordination and the service built on it
//!
//! - `resolve`: single-key lookup with one origin fetch per key at a time
//! - `fanout`: N concurrent random lookups, streamed in completion order
//! - `http`: the HTTP front that exposes both
//! - `server`: bootstrap (store, fetcher, listener, fatal-error shutdown)

pub mod fanout;
pub mod http;
pub mod resolve;
pub mod server;

pub use fanout::FanOut;
pub use resolve::{Provenance, Resolved, StampedeCoordinator};
pub use server::Server;
