//! HTTP and WebSocket front end of the config store.
//!
//! Every endpoint lives under `/api/v1/configs[/{namespace}[/{name}]]`. A plain
//! `GET` answers from the current snapshot; `?watch=true` on a WebSocket
//! upgrade registers a subscriber and streams the snapshot followed by every
//! change until either side goes away.

mod connection;
mod routes;
mod server;

pub use server::*;
