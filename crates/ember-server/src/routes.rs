//! Request routing and the JSON handlers.
//!
//! Handlers parse and validate on the async side, then run the protocol on a
//! blocking worker since every protocol call is a SQLite transaction.

use crate::error::{ApiError, json_response};
use crate::origin::RequestOrigin;
use bytes::Bytes;
use ember_core::api::{
    CommentRemovedResponse, CommentRequest, CommentResponse, ItemResponse, ShareRequest,
    ShareResponse, ViewRequest, ViewResponse, VoteRequest, VoteResponse,
};
use ember_core::model::{ItemId, VoteDirection};
use ember_core::{MetricsService, ProtocolError};
use http_body_util::{BodyExt, Full, Limited};
use hyper::body::Incoming;
use hyper::{HeaderMap, Method, Request, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, info};

/// Largest request body accepted.
pub const MAX_BODY_BYTES: usize = 16 * 1024;

type HandlerResult = Result<Response<Full<Bytes>>, ApiError>;

/// Shared state for every connection.
#[derive(Debug, Clone)]
pub struct AppState {
    pub service: Arc<MetricsService>,
}

impl AppState {
    #[must_use]
    pub fn new(service: MetricsService) -> Self {
        Self {
            service: Arc::new(service),
        }
    }
}

/// hyper entry point: read the (bounded) body, then route.
///
/// # Errors
///
/// Never fails; every failure is rendered as an error envelope.
pub async fn handle_request(
    state: Arc<AppState>,
    peer: SocketAddr,
    req: Request<Incoming>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let (parts, body) = req.into_parts();
    let body = match Limited::new(body, MAX_BODY_BYTES).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(err) => {
            debug!(%peer, error = %err, "failed to read request body");
            return Ok(ApiError::validation(format!("unreadable request body: {err}")).into_response());
        }
    };

    Ok(dispatch(&state, &parts.method, parts.uri.path(), &parts.headers, &body, peer).await)
}

/// Route one request whose body has already been read.
pub async fn dispatch(
    state: &AppState,
    method: &Method,
    path: &str,
    headers: &HeaderMap,
    body: &Bytes,
    peer: SocketAddr,
) -> Response<Full<Bytes>> {
    info!(%peer, %method, path, "request");
    let origin = RequestOrigin::from_headers(headers, peer);

    let result = match (method, path) {
        (&Method::GET, "/health") => Ok(json_response(
            StatusCode::OK,
            &serde_json::json!({ "status": "ok" }),
        )),
        (&Method::POST, "/api/vote") => vote(state, &origin, body).await,
        (&Method::POST, "/api/view") => view(state, &origin, body).await,
        (&Method::POST, "/api/share") => share(state, body).await,
        (&Method::POST, "/api/comments") => comment(state, &origin, body).await,
        (&Method::DELETE, p) if p.starts_with("/api/comments/") => {
            remove_comment(state, &p["/api/comments/".len()..]).await
        }
        (&Method::GET, p) if p.starts_with("/api/items/") => {
            item(state, &p["/api/items/".len()..]).await
        }
        _ => Err(ApiError::route_not_found(method, path)),
    };

    result.unwrap_or_else(ApiError::into_response)
}

async fn vote(state: &AppState, origin: &RequestOrigin, body: &Bytes) -> HandlerResult {
    let request: VoteRequest = parse_json(body)?;
    let item_id = parse_item_id(&request.item_id)?;
    let direction = request
        .direction
        .parse::<VoteDirection>()
        .map_err(ProtocolError::from)?;
    let identity = state.service.identify(&origin.origin, &origin.signature, None);

    let outcome = run_blocking(state, move |service| {
        service.vote(&item_id, direction, &identity)
    })
    .await?;
    Ok(json_response(StatusCode::OK, &VoteResponse::new(&outcome, direction)))
}

async fn view(state: &AppState, origin: &RequestOrigin, body: &Bytes) -> HandlerResult {
    let request: ViewRequest = parse_json(body)?;
    let item_id = parse_item_id(&request.item_id)?;
    let identity = state.service.identify(
        &origin.origin,
        &origin.signature,
        request.identity.as_deref(),
    );

    let viewed = run_blocking(state, move |service| service.view(&item_id, &identity)).await?;
    Ok(json_response(StatusCode::OK, &ViewResponse::from(&viewed)))
}

async fn share(state: &AppState, body: &Bytes) -> HandlerResult {
    let request: ShareRequest = parse_json(body)?;
    let item_id = parse_item_id(&request.item_id)?;

    let outcome = run_blocking(state, move |service| service.share(&item_id)).await?;
    Ok(json_response(StatusCode::OK, &ShareResponse::from(&outcome)))
}

async fn comment(state: &AppState, origin: &RequestOrigin, body: &Bytes) -> HandlerResult {
    let request: CommentRequest = parse_json(body)?;
    let item_id = parse_item_id(&request.item_id)?;
    let identity = state.service.identify(&origin.origin, &origin.signature, None);

    let created = run_blocking(state, move |service| {
        service.create_comment(&item_id, &request.content, &identity)
    })
    .await?;
    Ok(json_response(StatusCode::CREATED, &CommentResponse::from(&created)))
}

async fn remove_comment(state: &AppState, raw_id: &str) -> HandlerResult {
    let comment_id = raw_id
        .parse::<i64>()
        .map_err(|_| ApiError::validation(format!("invalid comment id '{raw_id}'")))?;

    let outcome = run_blocking(state, move |service| service.remove_comment(comment_id)).await?;
    Ok(json_response(StatusCode::OK, &CommentRemovedResponse::from(&outcome)))
}

async fn item(state: &AppState, raw_id: &str) -> HandlerResult {
    let item_id = parse_item_id(raw_id)?;
    let outcome = run_blocking(state, move |service| service.counters(&item_id)).await?;
    Ok(json_response(StatusCode::OK, &ItemResponse::from(&outcome)))
}

fn parse_json<T: DeserializeOwned>(body: &Bytes) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|err| ApiError::validation(format!("invalid JSON body: {err}")))
}

fn parse_item_id(raw: &str) -> Result<ItemId, ApiError> {
    ItemId::parse(raw).map_err(|err| ApiError::from(ProtocolError::from(err)))
}

async fn run_blocking<T, F>(state: &AppState, work: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&MetricsService) -> Result<T, ProtocolError> + Send + 'static,
{
    let service = Arc::clone(&state.service);
    tokio::task::spawn_blocking(move || work(&service))
        .await
        .map_err(|err| ApiError::internal(format!("worker task failed: {err}")))?
        .map_err(ApiError::from)
}
