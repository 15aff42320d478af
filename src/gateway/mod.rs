//! HTTP entry point: identity and origin checks, WebSocket upgrade, and the
//! small JSON surface next to it.

pub mod admin;
pub mod hosts;
pub mod identity;
pub mod origin;

use std::future::ready;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{Json, Router};
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{ConnectInfo, FromRequestParts, State, WebSocketUpgrade};
use axum::http::header::ORIGIN;
use axum::http::request::Parts;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use futures::{Sink, SinkExt, Stream, StreamExt, TryStreamExt};
use serde_json::json;

use crate::error::ProtocolError;
use crate::proxy::{self, Flavor, Outbound, ProxyContext};
use crate::security_log;

pub use identity::{AuthenticatedCaller, IdentityProvider, StaticTokenIdentity};
pub use origin::OriginPolicy;

/// Shared state for every route.
#[derive(Clone)]
pub struct AppState {
    pub proxy: Arc<ProxyContext>,
    pub identity: Arc<dyn IdentityProvider>,
    pub origins: Arc<OriginPolicy>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ws/ssh", get(terminal_ws))
        .route("/ws/sftp", get(transfer_ws))
        .route("/health", get(admin::health))
        .route("/api/admin/sessions", get(admin::list_sessions))
        .route("/api/hosts", get(hosts::list).post(hosts::create))
        .route(
            "/api/hosts/{id}",
            get(hosts::get_one).put(hosts::update).delete(hosts::delete),
        )
        .with_state(state)
}

/// `{"error": message}` with `status`.
pub(crate) fn json_error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

/// The authenticated caller; rejects with 401.
pub struct Caller(pub AuthenticatedCaller);

impl FromRequestParts<AppState> for Caller {
    type Rejection = StatusCode;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        match state.identity.identify(&parts.headers) {
            Some(caller) => Ok(Caller(caller)),
            None => {
                security_log::log_caller_rejected(parts.uri.path());
                Err(StatusCode::UNAUTHORIZED)
            }
        }
    }
}

/// Passes when the `Origin` header is absent or allow-listed; rejects with
/// 403.
pub struct AllowedOrigin;

impl FromRequestParts<AppState> for AllowedOrigin {
    type Rejection = StatusCode;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let origin = parts.headers.get(ORIGIN).map(|v| v.to_str().unwrap_or(""));
        if state.origins.permits(origin) {
            Ok(AllowedOrigin)
        } else {
            security_log::log_origin_rejected(origin, parts.uri.path());
            Err(StatusCode::FORBIDDEN)
        }
    }
}

// Extractor order matters: identity, then origin, then the upgrade itself.
async fn terminal_ws(
    Caller(caller): Caller,
    _origin: AllowedOrigin,
    headers: HeaderMap,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> Response {
    upgrade(Flavor::Terminal, ws, state, caller, client_addr(&headers, peer))
}

async fn transfer_ws(
    Caller(caller): Caller,
    _origin: AllowedOrigin,
    headers: HeaderMap,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> Response {
    upgrade(Flavor::Transfer, ws, state, caller, client_addr(&headers, peer))
}

fn upgrade(
    flavor: Flavor,
    ws: WebSocketUpgrade,
    state: AppState,
    caller: AuthenticatedCaller,
    client_addr: String,
) -> Response {
    ws.on_upgrade(move |socket| async move {
        let (sink, inbound) = split_socket(socket);
        let outbound = Outbound::new(sink);

        proxy::serve_stream(
            flavor,
            &state.proxy,
            &caller.user_id,
            &client_addr,
            outbound.clone(),
            inbound,
        )
        .await;

        outbound.close().await;
        tracing::debug!(flavor = ?flavor, client_addr = %client_addr, "Stream finished");
    })
}

/// `X-Real-IP` from the fronting proxy, else the peer address.
fn client_addr(headers: &HeaderMap, peer: SocketAddr) -> String {
    headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| peer.to_string())
}

/// Text frames in and out. Binary frames that are valid UTF-8 are accepted
/// as text; control frames are skipped.
fn split_socket(
    socket: WebSocket,
) -> (
    impl Sink<String, Error = axum::Error> + Unpin + Send + 'static,
    impl Stream<Item = Result<String, ProtocolError>> + Unpin + Send,
) {
    let (sink, stream) = socket.split();

    let sink = sink.with(|text: String| ready(Ok::<_, axum::Error>(Message::Text(text.into()))));

    let stream = stream
        .map_err(|e| ProtocolError::Transport(e.to_string()))
        .try_filter_map(|message| {
            let text = match message {
                // axum's buffer is shared `Bytes` and is freed unwiped
                Message::Text(text) => Some(text.as_str().to_owned()),
                Message::Binary(bytes) => String::from_utf8(bytes.to_vec()).ok(),
                _ => None,
            };
            ready(Ok(text))
        });

    (sink, Box::pin(stream))
}
