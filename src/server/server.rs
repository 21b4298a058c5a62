use std::net::SocketAddr;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use tokio_util::sync::CancellationToken;
use tracing::error;
use tracing::info;

use super::routes::routes;
use super::routes::ServerState;
use crate::metrics::init_metrics;
use crate::ConfigEntry;
use crate::ConfigFilter;
use crate::ConfigId;
use crate::ConfigObject;
use crate::Delta;
use crate::Dispatcher;
use crate::Result;
use crate::ServerError;
use crate::Settings;

/// Config discovery server
///
/// Owns the dispatcher (and through it the store). Configurations are pushed
/// in with [`Server::update_config`]; remote clients fetch or watch them over
/// HTTP and WebSocket once [`Server::start`] has bound the listener.
#[derive(Debug)]
pub struct Server<C: ConfigObject> {
    settings: Arc<Settings>,
    dispatcher: Arc<Dispatcher<C>>,
    /// Address of the running listener, cleared when it stops
    local_addr: Arc<ArcSwapOption<SocketAddr>>,
}

impl<C: ConfigObject> Server<C> {
    pub fn new(settings: Settings) -> Self {
        let dispatcher = Arc::new(Dispatcher::new(settings.server.outbound_queue_warn_threshold));
        Self {
            settings: Arc::new(settings),
            dispatcher,
            local_addr: Arc::new(ArcSwapOption::empty()),
        }
    }

    /// Bind the listener and serve in the background until `token` is cancelled.
    ///
    /// Returns the bound address once the server is accepting, or
    /// `Error::Config` for unusable keepalive timings. Cancelling the
    /// token closes every open watch connection and releases the listener, so
    /// a new server can bind the same address afterwards.
    pub async fn start(
        &self,
        token: CancellationToken,
    ) -> Result<SocketAddr> {
        if let Some(addr) = self.local_addr.load_full() {
            return Err(ServerError::AlreadyStarted(*addr).into());
        }
        self.settings.keepalive.validate()?;

        let listen_address = &self.settings.server.listen_address;
        let addr: SocketAddr = listen_address.parse().map_err(|e| ServerError::Bind {
            address: listen_address.clone(),
            reason: format!("{e}"),
        })?;

        init_metrics();

        let state = Arc::new(ServerState {
            dispatcher: self.dispatcher.clone(),
            keepalive: self.settings.keepalive,
            shutdown: token.child_token(),
        });
        let shutdown = state.shutdown.clone();

        let (bound, server) = warp::serve(routes(state))
            .try_bind_with_graceful_shutdown(addr, async move {
                shutdown.cancelled().await;
            })
            .map_err(|e| {
                error!(%addr, "failed to bind listener: {e}");
                ServerError::Bind {
                    address: listen_address.clone(),
                    reason: format!("{e}"),
                }
            })?;

        self.local_addr.store(Some(Arc::new(bound)));
        info!(%bound, "config discovery server listening");

        let local_addr = self.local_addr.clone();
        tokio::spawn(async move {
            server.await;
            local_addr.store(None);
            info!(%bound, "config discovery server stopped");
        });

        Ok(bound)
    }

    /// Replace all configurations and notify watchers of what changed.
    ///
    /// The sole write entry point; a rejected update leaves the previous
    /// contents in place.
    pub fn update_config(
        &self,
        entries: Vec<ConfigEntry<C>>,
    ) -> Result<Delta<C>> {
        self.dispatcher.update_config(entries)
    }

    pub fn get(
        &self,
        id: &ConfigId,
    ) -> Option<C> {
        self.dispatcher.get(id)
    }

    pub fn snapshot(&self) -> Vec<ConfigEntry<C>> {
        self.dispatcher.snapshot()
    }

    pub fn snapshot_filtered(
        &self,
        filter: &ConfigFilter,
    ) -> Vec<ConfigEntry<C>> {
        self.dispatcher.snapshot_filtered(filter)
    }

    /// Address of the running listener, if any
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr.load_full().map(|addr| *addr)
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher<C>> {
        &self.dispatcher
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }
}
