//! Client side of config discovery
//!
//! Provides:
//! - [`ConfigClient`] - one server address, one filter, three consumption modes
//! - [`SessionState`] - observable state of the streaming session
//!
//! # Basic Usage
//! ```no_run
//! use cds::{ConfigClient, Settings};
//! use serde::{Deserialize, Serialize};
//! use tokio_util::sync::CancellationToken;
//!
//! #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
//! struct Gateway {
//!     realm: String,
//! }
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let settings = Settings::default();
//!     let client = ConfigClient::<Gateway>::for_id("127.0.0.1:13478", "ns1/gw1", &settings).unwrap();
//!
//!     // One-shot
//!     let gateway = client.load_config().await.unwrap();
//!     println!("current: {:?}", gateway);
//!
//!     // Continuous, survives reconnects
//!     let token = CancellationToken::new();
//!     let (tx, mut rx) = tokio::sync::mpsc::channel(8);
//!     client.watch(token.clone(), tx).unwrap();
//!     while let Some(entry) = rx.recv().await {
//!         println!("{} -> {:?}", entry.id, entry.config);
//!     }
//! }
//! ```

mod client;
mod session;

pub use client::*;
pub use session::SessionState;
