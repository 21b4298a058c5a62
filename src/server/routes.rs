use std::convert::Infallible;
use std::sync::Arc;

use autometrics::autometrics;
use percent_encoding::percent_decode_str;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use warp::http::StatusCode;
use warp::reply::Response;
use warp::ws::Ws;
use warp::Filter;
use warp::Rejection;
use warp::Reply;

use super::connection::Connection;
use crate::metrics::gather_metrics;
use crate::ApiError;
use crate::ConfigFilter;
use crate::ConfigList;
use crate::ConfigObject;
use crate::Dispatcher;
use crate::KeepaliveConfig;

/// Shared by every request handled by one running server
#[derive(Debug)]
pub(crate) struct ServerState<C> {
    pub(crate) dispatcher: Arc<Dispatcher<C>>,
    pub(crate) keepalive: KeepaliveConfig,
    /// Cancelled when the server stops; upgraded connections watch it
    pub(crate) shutdown: CancellationToken,
}

/// Query flags accepted on the config endpoints
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ConfigQuery {
    #[serde(default)]
    pub(crate) watch: bool,
    /// Name of the requesting node, logged only
    #[serde(default)]
    pub(crate) node: Option<String>,
}

pub(crate) fn routes<C: ConfigObject>(
    state: Arc<ServerState<C>>
) -> impl Filter<Extract = (Response,), Error = Infallible> + Clone + Send + Sync + 'static {
    let configs = config_filter()
        .and(warp::get())
        .and(warp::query::<ConfigQuery>())
        .and(optional_ws())
        .and(with_state(state))
        .and_then(serve_configs);

    let metrics = warp::path!("metrics")
        .and(warp::get())
        .map(|| gather_metrics().into_response());

    configs.or(metrics).unify().recover(handle_rejection).unify()
}

/// `/api/v1/configs[/{namespace}[/{name}]]` mapped onto the matching filter
fn config_filter() -> impl Filter<Extract = (ConfigFilter,), Error = Rejection> + Clone {
    let all = warp::path!("api" / "v1" / "configs").map(|| ConfigFilter::All);
    let namespace = warp::path!("api" / "v1" / "configs" / String).and_then(|ns: String| async move {
        Ok::<_, Rejection>(ConfigFilter::from_segments(Some(decode_segment(&ns)?), None))
    });
    let exact = warp::path!("api" / "v1" / "configs" / String / String).and_then(
        |ns: String, name: String| async move {
            Ok::<_, Rejection>(ConfigFilter::from_segments(
                Some(decode_segment(&ns)?),
                Some(decode_segment(&name)?),
            ))
        },
    );

    all.or(namespace).unify().or(exact).unify()
}

/// Path params arrive percent-encoded
fn decode_segment(segment: &str) -> Result<String, Rejection> {
    percent_decode_str(segment)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .map_err(|_| warp::reject::not_found())
}

/// Present only when the request asks for a WebSocket upgrade
fn optional_ws() -> impl Filter<Extract = (Option<Ws>,), Error = Infallible> + Clone {
    warp::ws()
        .map(Some)
        .or(warp::any().map(|| None))
        .unify()
}

fn with_state<C: ConfigObject>(
    state: Arc<ServerState<C>>
) -> impl Filter<Extract = (Arc<ServerState<C>>,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

async fn serve_configs<C: ConfigObject>(
    filter: ConfigFilter,
    query: ConfigQuery,
    ws: Option<Ws>,
    state: Arc<ServerState<C>>,
) -> Result<Response, Rejection> {
    if !query.watch {
        return Ok(load_configs(&filter, &state.dispatcher));
    }

    let Some(ws) = ws else {
        return Ok(error_reply(
            StatusCode::BAD_REQUEST,
            "watch=true requires a WebSocket upgrade",
        ));
    };

    info!(%filter, node = ?query.node, "watch requested");
    let subscription = state.dispatcher.register(filter);
    let connection = Connection::new(
        subscription,
        query.node,
        state.keepalive,
        state.shutdown.child_token(),
    );
    Ok(ws
        .on_upgrade(move |socket| connection.run(socket))
        .into_response())
}

/// One-shot fetch answered straight from the store
#[autometrics]
fn load_configs<C: ConfigObject>(
    filter: &ConfigFilter,
    dispatcher: &Dispatcher<C>,
) -> Response {
    let items = dispatcher.snapshot_filtered(filter);
    debug!(%filter, count = items.len(), "one-shot load");

    match filter {
        ConfigFilter::Exact(id) => match items.into_iter().next() {
            Some(entry) => warp::reply::json(&entry).into_response(),
            None => error_reply(StatusCode::NOT_FOUND, format!("config {id} not found")),
        },
        _ => warp::reply::json(&ConfigList::new(items)).into_response(),
    }
}

fn error_reply(
    status: StatusCode,
    message: impl Into<String>,
) -> Response {
    let body = ApiError::new(status.as_u16(), message);
    warp::reply::with_status(warp::reply::json(&body), status).into_response()
}

async fn handle_rejection(rejection: Rejection) -> Result<Response, Infallible> {
    let (status, message) = if rejection.is_not_found() {
        (StatusCode::NOT_FOUND, "not found".to_string())
    } else if let Some(e) = rejection.find::<warp::reject::InvalidQuery>() {
        (StatusCode::BAD_REQUEST, e.to_string())
    } else if rejection.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "method not allowed".to_string())
    } else {
        (StatusCode::INTERNAL_SERVER_ERROR, format!("{rejection:?}"))
    };

    Ok(error_reply(status, message))
}
