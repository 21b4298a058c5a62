//! Authoritative in-memory configuration storage.
//!
//! Nothing is persisted: the store starts empty and is repopulated wholesale by
//! the producer through bulk updates.

mod config_store;

pub use config_store::*;
