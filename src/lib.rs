//! Config discovery: one authoritative in-memory store of named configurations,
//! streamed to many remote watchers.
//!
//! - [`Server`] owns the store and serves it over HTTP and WebSocket
//! - [`ConfigClient`] fetches, polls or watches a filtered view of it
//! - [`Dispatcher`] fans store changes out to per-subscriber coalescing queues

mod client;
mod config;
mod constants;
mod errors;
mod metrics;
mod proto;
mod server;
mod storage;
mod watch;
pub mod utils;

pub use client::*;
pub use config::*;
pub use constants::*;
pub use errors::*;
pub use metrics::*;
pub use proto::*;
pub use server::*;
pub use storage::*;
pub use watch::*;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub mod test_utils;
