//! Configuration management for the config discovery server and client.
//!
//! Provides layered configuration loading with priority:
//! 1. Default values (hardcoded)
//! 2. Config file (explicit path, or `CONFIG_PATH`)
//! 3. Environment variables (highest priority), e.g. `CDS__KEEPALIVE__PING_PERIOD_MS=500`
//!

mod client;
mod keepalive;
mod server;
pub use client::*;
pub use keepalive::*;
pub use server::*;


//---
use std::env;

use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::constants::ENV_PREFIX;
use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Settings {
    /// Listener and per-connection queue settings
    #[serde(default)]
    pub server: ServerConfig,
    /// Liveness probing and reconnect timing, shared by both ends
    #[serde(default)]
    pub keepalive: KeepaliveConfig,
    /// One-shot request settings of the client
    #[serde(default)]
    pub client: ClientConfig,
}

impl Settings {
    /// Load configuration from multiple sources with priority:
    /// 1. Hardcoded defaults
    /// 2. `path`, or the file named by `CONFIG_PATH`
    /// 3. `CDS__*` environment variables
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = Config::builder()
            .add_source(Config::try_from(&Settings::default())?);

        if let Some(path) = path {
            builder = builder.add_source(File::with_name(path).required(true));
        } else if let Ok(path) = env::var("CONFIG_PATH") {
            builder = builder.add_source(File::with_name(&path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .ignore_empty(true)
                .try_parsing(true),
        );

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        self.server.validate()?;
        self.keepalive.validate()?;
        self.client.validate()?;
        Ok(())
    }
}
