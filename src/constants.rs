// -
// Wire surface

/// Root of the config endpoint family
pub const API_PATH_PREFIX: &str = "/api/v1/configs";

/// Schema version carried by list payloads
pub const API_VERSION: &str = "v1";

/// Query flag switching a request into streaming mode
pub(crate) const WATCH_QUERY_PARAM: &str = "watch";

// -
// Defaults

/// Default config discovery port
pub const DEFAULT_PORT: u16 = 13478;
pub const DEFAULT_LISTEN_ADDRESS: &str = "0.0.0.0:13478";

/// Length of generated connection ids
pub(crate) const CONNECTION_ID_LEN: usize = 10;

/// Prefix for environment overrides, e.g. `CDS__KEEPALIVE__PING_PERIOD_MS`
pub(crate) const ENV_PREFIX: &str = "CDS";
