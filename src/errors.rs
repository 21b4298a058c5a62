//! Config Discovery Error Hierarchy
//!
//! Defines the error types of the config distribution system, categorized by
//! the layer that produced them: the authoritative store, the transport, the
//! client surface and the server lifecycle.

use std::net::SocketAddr;
use std::time::Duration;

use config::ConfigError;

use crate::ConfigId;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Authoritative store rejections
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Transient transport failures (connect, read/write deadlines, liveness)
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Client-side misconfiguration and consumer errors
    #[error(transparent)]
    Client(#[from] ClientError),

    /// Server lifecycle failures
    #[error(transparent)]
    Server(#[from] ServerError),

    /// Settings loading or validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Payload encoding/decoding failures
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Unrecoverable failures requiring process termination
    #[error("Fatal error: {0}")]
    Fatal(String),
}

impl Error {
    /// Whether the failure is expected to clear up by retrying the same call.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Connection(_) | Error::Serialization(_))
    }

    /// Whether the failure reports an absent configuration.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Store(StoreError::NotFound(_)))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A bulk update listed the same id more than once; nothing was applied
    #[error("Duplicate config id in update: {0}")]
    DuplicateId(ConfigId),

    /// No configuration is stored under the requested id
    #[error("Config not found: {0}")]
    NotFound(ConfigId),
}

#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// Transport could not be opened
    #[error("Failed to connect to {target}: {reason}")]
    Connect { target: String, reason: String },

    /// An operation did not complete within its deadline
    #[error("{operation} timed out after {duration:?}")]
    Timeout {
        operation: &'static str,
        duration: Duration,
    },

    /// No liveness acknowledgment arrived within the wait window
    #[error("No liveness acknowledgment within {0:?}")]
    LivenessTimeout(Duration),

    /// Peer closed the transport
    #[error("Connection closed by peer")]
    Closed,

    #[error(transparent)]
    WebSocket(#[from] Box<tokio_tungstenite::tungstenite::Error>),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// Server answered with a status the client cannot interpret
    #[error("Unexpected HTTP status {status}: {message}")]
    UnexpectedStatus { status: u16, message: String },
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Invalid server address: {0}")]
    InvalidAddress(String),

    #[error("Invalid config id {0:?}: expected <namespace>/<name>")]
    InvalidConfigId(String),

    #[error("Operation requires an exact config filter, got {0}")]
    FilterNotExact(String),

    /// The consumer dropped the receiving end of the output channel
    #[error("Output channel closed")]
    OutputClosed,
}

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind listener on {address}: {reason}")]
    Bind { address: String, reason: String },

    #[error("Server already listening on {0}")]
    AlreadyStarted(SocketAddr),
}

impl From<tokio_tungstenite::tungstenite::Error> for ConnectionError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        ConnectionError::WebSocket(Box::new(e))
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        Error::Connection(e.into())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Connection(ConnectionError::Http(e))
    }
}
