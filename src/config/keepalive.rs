use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Liveness probing and reconnect timing
///
/// Both ends of a streaming connection use the same knobs:
/// - every `ping_period_ms` a Ping probe is sent
/// - if nothing (Pong or data) arrives for `pong_wait_ms`, the peer is considered gone
/// - a single frame write that takes longer than `write_wait_ms` closes the connection
/// - a watching client waits `retry_period_ms` between reconnect attempts
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct KeepaliveConfig {
    /// Interval between liveness probes (milliseconds)
    #[serde(default = "default_ping_period_ms")]
    pub ping_period_ms: u64,

    /// Maximum silence tolerated from the peer (milliseconds)
    #[serde(default = "default_pong_wait_ms")]
    pub pong_wait_ms: u64,

    /// Per-write deadline (milliseconds)
    #[serde(default = "default_write_wait_ms")]
    pub write_wait_ms: u64,

    /// Backoff between reconnect attempts (milliseconds)
    #[serde(default = "default_retry_period_ms")]
    pub retry_period_ms: u64,
}

impl Default for KeepaliveConfig {
    fn default() -> Self {
        Self {
            ping_period_ms: default_ping_period_ms(),
            pong_wait_ms: default_pong_wait_ms(),
            write_wait_ms: default_write_wait_ms(),
            retry_period_ms: default_retry_period_ms(),
        }
    }
}

impl KeepaliveConfig {
    pub fn ping_period(&self) -> Duration {
        Duration::from_millis(self.ping_period_ms)
    }

    pub fn pong_wait(&self) -> Duration {
        Duration::from_millis(self.pong_wait_ms)
    }

    pub fn write_wait(&self) -> Duration {
        Duration::from_millis(self.write_wait_ms)
    }

    pub fn retry_period(&self) -> Duration {
        Duration::from_millis(self.retry_period_ms)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("ping_period_ms", self.ping_period_ms),
            ("pong_wait_ms", self.pong_wait_ms),
            ("write_wait_ms", self.write_wait_ms),
            ("retry_period_ms", self.retry_period_ms),
        ] {
            if value == 0 {
                return Err(Error::Config(ConfigError::Message(format!(
                    "keepalive.{name} must be greater than 0"
                ))));
            }
        }

        // A probe must be able to arrive before the peer gives up on us
        if self.pong_wait_ms <= self.ping_period_ms {
            return Err(Error::Config(ConfigError::Message(format!(
                "keepalive.pong_wait_ms ({}) must exceed keepalive.ping_period_ms ({})",
                self.pong_wait_ms, self.ping_period_ms
            ))));
        }

        Ok(())
    }
}

fn default_ping_period_ms() -> u64 {
    5000
}
fn default_pong_wait_ms() -> u64 {
    8000
}
fn default_write_wait_ms() -> u64 {
    2000
}
fn default_retry_period_ms() -> u64 {
    1000
}
