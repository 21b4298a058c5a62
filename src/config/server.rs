use std::net::SocketAddr;
use std::path::PathBuf;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::constants::DEFAULT_LISTEN_ADDRESS;
use crate::Error;
use crate::Result;

/// Server-side listener and fan-out parameters
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Socket address the HTTP/WebSocket listener binds to
    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    /// Distinct pending ids in one subscriber queue past which a warning is
    /// logged. Queues coalesce by id, so they never hold more than one value
    /// per stored config; nothing is dropped at this threshold.
    #[serde(default = "default_outbound_queue_warn_threshold")]
    pub outbound_queue_warn_threshold: usize,

    /// Optional JSON file holding a list of `{ "id": "ns/name", "config": ... }`
    /// entries, loaded by the daemon at startup
    #[serde(default)]
    pub seed_file: Option<PathBuf>,

    /// Directory for the daemon log file; logs go to stdout when unset
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
            outbound_queue_warn_threshold: default_outbound_queue_warn_threshold(),
            seed_file: None,
            log_dir: None,
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.listen_address.parse::<SocketAddr>().is_err() {
            return Err(Error::Config(ConfigError::Message(format!(
                "server.listen_address {:?} is not a valid socket address",
                self.listen_address
            ))));
        }

        if self.outbound_queue_warn_threshold == 0 {
            return Err(Error::Config(ConfigError::Message(
                "server.outbound_queue_warn_threshold must be greater than 0".into(),
            )));
        }

        Ok(())
    }
}

fn default_listen_address() -> String {
    DEFAULT_LISTEN_ADDRESS.to_string()
}
fn default_outbound_queue_warn_threshold() -> usize {
    256
}
