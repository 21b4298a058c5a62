//! Config discovery client
//!
//! [`ConfigClient`] follows one filter on one server and offers three ways to
//! consume it: a one-shot [`load`](ConfigClient::load), a first-value
//! [`poll`](ConfigClient::poll) and a reconnecting
//! [`watch`](ConfigClient::watch).

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;
use url::Url;

use super::session::Session;
use super::session::SessionState;
use super::session::StreamEnd;
use crate::constants::DEFAULT_PORT;
use crate::constants::WATCH_QUERY_PARAM;
use crate::ApiError;
use crate::ClientError;
use crate::ConfigEntry;
use crate::ConfigFilter;
use crate::ConfigId;
use crate::ConfigList;
use crate::ConfigObject;
use crate::ConnectionError;
use crate::KeepaliveConfig;
use crate::Result;
use crate::Settings;
use crate::StoreError;

/// Client bound to one server address and one filter
///
/// Cheap to clone; clones share the session state observed through
/// [`state()`](ConfigClient::state).
///
/// # Examples
/// ```rust,ignore
/// let client = ConfigClient::<MyConfig>::for_id("127.0.0.1:13478", "ns1/gw1", &Settings::default())?;
/// let config = client.load_config().await?;
///
/// let (tx, mut rx) = tokio::sync::mpsc::channel(8);
/// client.watch(token.clone(), tx)?;
/// while let Some(entry) = rx.recv().await {
///     apply(entry.config);
/// }
/// ```
#[derive(Debug, Clone)]
pub struct ConfigClient<C> {
    filter: ConfigFilter,
    node: Option<String>,
    /// `http://host:port/`
    base: Url,
    http: reqwest::Client,
    keepalive: KeepaliveConfig,
    connect_timeout: Duration,
    state: Arc<watch::Sender<SessionState>>,
    _config: PhantomData<fn() -> C>,
}

impl<C: ConfigObject> ConfigClient<C> {
    /// Create a client for `filter` on the server at `address`.
    ///
    /// `address` may be `host:port`, `http://host:port` or `ws://host:port`;
    /// the port defaults to the standard config discovery port. Keepalive and
    /// client timings are validated here, so a zero period fails with
    /// `Error::Config` instead of surfacing in a running session.
    pub fn new(
        address: &str,
        filter: ConfigFilter,
        settings: &Settings,
    ) -> Result<Self> {
        settings.keepalive.validate()?;
        settings.client.validate()?;
        let base = parse_address(address)?;
        let http = reqwest::Client::builder()
            .connect_timeout(settings.client.connect_timeout())
            .timeout(settings.client.request_timeout())
            .build()?;
        let (state, _) = watch::channel(SessionState::Disconnected);

        debug!(%base, %filter, "config client created");
        Ok(Self {
            filter,
            node: None,
            base,
            http,
            keepalive: settings.keepalive,
            connect_timeout: settings.client.connect_timeout(),
            state: Arc::new(state),
            _config: PhantomData,
        })
    }

    /// Client for a single id given as `namespace/name`
    pub fn for_id(
        address: &str,
        id: &str,
        settings: &Settings,
    ) -> Result<Self> {
        let id: ConfigId = id.parse()?;
        Self::new(address, ConfigFilter::Exact(id), settings)
    }

    pub fn all(
        address: &str,
        settings: &Settings,
    ) -> Result<Self> {
        Self::new(address, ConfigFilter::All, settings)
    }

    pub fn namespace(
        address: &str,
        namespace: impl Into<String>,
        settings: &Settings,
    ) -> Result<Self> {
        Self::new(address, ConfigFilter::Namespace(namespace.into()), settings)
    }

    pub fn exact(
        address: &str,
        namespace: impl Into<String>,
        name: impl Into<String>,
        settings: &Settings,
    ) -> Result<Self> {
        Self::new(
            address,
            ConfigFilter::Exact(ConfigId::new(namespace, name)),
            settings,
        )
    }

    /// Report `node` to the server with every request
    pub fn with_node(
        mut self,
        node: impl Into<String>,
    ) -> Self {
        self.node = Some(node.into());
        self
    }

    pub fn filter(&self) -> &ConfigFilter {
        &self.filter
    }

    /// Observe the session state machine
    pub fn state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Fetch the entries currently matching the filter.
    ///
    /// An exact filter with no stored entry fails with `NotFound`; for other
    /// filters an empty result is an empty list.
    pub async fn load(&self) -> Result<Vec<ConfigEntry<C>>> {
        let url = self.endpoint(false)?;
        let response = self.http.get(url).send().await?;
        let status = response.status();

        if status.is_success() {
            return match &self.filter {
                ConfigFilter::Exact(_) => Ok(vec![response.json::<ConfigEntry<C>>().await?]),
                _ => Ok(response.json::<ConfigList<C>>().await?.items),
            };
        }

        if status == StatusCode::NOT_FOUND {
            if let ConfigFilter::Exact(id) = &self.filter {
                return Err(StoreError::NotFound(id.clone()).into());
            }
        }

        let message = response
            .json::<ApiError>()
            .await
            .ok()
            .and_then(|e| e.message)
            .unwrap_or_else(|| status.to_string());
        Err(ConnectionError::UnexpectedStatus {
            status: status.as_u16(),
            message,
        }
        .into())
    }

    /// Fetch the single configuration selected by an exact filter
    pub async fn load_config(&self) -> Result<C> {
        let ConfigFilter::Exact(id) = &self.filter else {
            return Err(ClientError::FilterNotExact(self.filter.to_string()).into());
        };

        self.load()
            .await?
            .into_iter()
            .next()
            .map(|entry| entry.config)
            .ok_or_else(|| StoreError::NotFound(id.clone()).into())
    }

    /// Wait for the next matching entry, forward it to `out` and return.
    ///
    /// Cancellation is a clean stop and returns `Ok`. A transport failure while
    /// waiting is returned to the caller, who may poll again.
    pub async fn poll(
        &self,
        token: CancellationToken,
        out: mpsc::Sender<ConfigEntry<C>>,
    ) -> Result<()> {
        let session = self.session()?;

        self.set_state(SessionState::Connecting);
        let ws = tokio::select! {
            _ = token.cancelled() => {
                self.set_state(SessionState::Disconnected);
                return Ok(());
            }
            ws = session.connect() => match ws {
                Ok(ws) => ws,
                Err(e) => {
                    self.set_state(SessionState::Disconnected);
                    return Err(e);
                }
            },
        };
        self.set_state(SessionState::Synced);

        let end = session
            .stream(ws, &self.filter, &token, &out, true)
            .await;
        self.set_state(SessionState::Disconnected);

        match end? {
            StreamEnd::OutputClosed => Err(ClientError::OutputClosed.into()),
            StreamEnd::Cancelled | StreamEnd::Delivered => Ok(()),
        }
    }

    /// Stream every matching entry to `out` from a background task.
    ///
    /// Returns as soon as the task is scheduled. The task reconnects after
    /// `keepalive.retry_period_ms` whenever the connection is lost and replays
    /// the full snapshot on every reconnect, so unchanged values may be
    /// delivered again. It ends when `token` is cancelled or `out` is closed.
    pub fn watch(
        &self,
        token: CancellationToken,
        out: mpsc::Sender<ConfigEntry<C>>,
    ) -> Result<JoinHandle<()>> {
        if out.is_closed() {
            return Err(ClientError::OutputClosed.into());
        }
        let session = self.session()?;
        let client = self.clone();

        Ok(tokio::spawn(async move {
            client.watch_loop(session, token, out).await;
        }))
    }

    async fn watch_loop(
        &self,
        session: Session,
        token: CancellationToken,
        out: mpsc::Sender<ConfigEntry<C>>,
    ) {
        let retry_period = self.keepalive.retry_period();
        info!(url = %session.url(), filter = %self.filter, "watch started");

        loop {
            self.set_state(SessionState::Connecting);

            let connected = tokio::select! {
                _ = token.cancelled() => break,
                ws = session.connect() => ws,
            };

            match connected {
                Ok(ws) => {
                    self.set_state(SessionState::Synced);
                    debug!(url = %session.url(), "watch connected");

                    match session.stream(ws, &self.filter, &token, &out, false).await {
                        Ok(StreamEnd::Cancelled) | Ok(StreamEnd::OutputClosed) => break,
                        Ok(StreamEnd::Delivered) => {}
                        Err(e) if e.is_transient() => {
                            info!(url = %session.url(), "watch connection lost: {e}")
                        }
                        Err(e) => warn!(url = %session.url(), "watch connection failed: {e}"),
                    }
                }
                Err(e) => debug!(url = %session.url(), "watch connect failed: {e}"),
            }

            self.set_state(SessionState::Disconnected);
            tokio::select! {
                _ = token.cancelled() => break,
                _ = out.closed() => break,
                _ = sleep(retry_period) => {}
            }
        }

        self.set_state(SessionState::Disconnected);
        info!(url = %session.url(), filter = %self.filter, "watch stopped");
    }

    fn session(&self) -> Result<Session> {
        Ok(Session::new(
            self.endpoint(true)?,
            self.keepalive,
            self.connect_timeout,
        ))
    }

    /// Request URL for the filter; streaming requests use the `ws` scheme
    pub(crate) fn endpoint(
        &self,
        watch: bool,
    ) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| ClientError::InvalidAddress(self.base.to_string()))?
            .clear()
            .extend(self.filter.path_segments());

        if watch {
            url.set_scheme("ws")
                .map_err(|_| ClientError::InvalidAddress(self.base.to_string()))?;
            url.query_pairs_mut().append_pair(WATCH_QUERY_PARAM, "true");
        }
        if let Some(node) = &self.node {
            url.query_pairs_mut().append_pair("node", node);
        }

        Ok(url)
    }

    fn set_state(
        &self,
        state: SessionState,
    ) {
        self.state.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            *current = state;
            true
        });
    }
}

/// Normalize a server address into an `http://host:port/` base URL
pub(crate) fn parse_address(address: &str) -> Result<Url> {
    let invalid = || ClientError::InvalidAddress(address.to_string());

    let with_scheme = if address.contains("://") {
        address.to_string()
    } else {
        format!("http://{address}")
    };
    let mut url = Url::parse(&with_scheme).map_err(|_| invalid())?;

    match url.scheme() {
        "http" => {}
        "ws" => url.set_scheme("http").map_err(|_| invalid())?,
        _ => return Err(invalid().into()),
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(invalid().into());
    }
    if url.path() != "/" || url.query().is_some() {
        return Err(invalid().into());
    }
    // `Url` hides an explicit `:80`, indistinguishable from no port at all
    if url.port().is_none() && !has_explicit_port(&with_scheme) {
        url.set_port(Some(DEFAULT_PORT)).map_err(|_| invalid())?;
    }

    Ok(url)
}

/// Whether the authority of `address` (`scheme://authority/...`) names a port
fn has_explicit_port(address: &str) -> bool {
    let rest = address.split_once("://").map_or(address, |(_, rest)| rest);
    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    let host_port = authority.rsplit_once('@').map_or(authority, |(_, host_port)| host_port);

    host_port.rsplit_once(':').is_some_and(|(host, port)| {
        !port.is_empty()
            && port.bytes().all(|b| b.is_ascii_digit())
            && (!host.starts_with('[') || host.ends_with(']'))
    })
}
