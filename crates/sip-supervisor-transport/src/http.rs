//! HTTP status and keypad control endpoints.

use std::{
    future::Future,
    net::{IpAddr, SocketAddr},
    sync::Arc,
};

use axum::{
    Json, Router,
    body::Bytes,
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{
        IntoResponse, Response,
        sse::{KeepAlive, Sse},
    },
    routing::{get, post},
};
use sip_supervisor_core::{SessionState, StateStore};
use sip_supervisor_session::CallController;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::protocol::{ErrorResponse, HealthResponse, KeypressRequest, KeypressResponse};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<StateStore>,
    pub controller: Arc<CallController>,
}

impl AppState {
    /// Create handler state around `controller` and its store.
    #[must_use]
    pub fn new(controller: Arc<CallController>) -> Self {
        Self {
            store: Arc::clone(controller.store()),
            controller,
        }
    }
}

/// Whether `ip` is a loopback address, including IPv4-mapped IPv6.
#[must_use]
pub fn is_loopback(ip: IpAddr) -> bool {
    ip.to_canonical().is_loopback()
}

/// Build the router.
///
/// `/keypress` is only reachable from loopback; the server must be run with
/// connect info (see [`serve`]).
#[must_use]
pub fn router(state: AppState) -> Router {
    let control = Router::new()
        .route("/keypress", post(keypress_handler))
        .route_layer(middleware::from_fn(require_loopback));

    Router::new()
        .route("/status", get(status_handler))
        .route("/events", get(events_handler))
        .route("/health", get(health_handler))
        .merge(control)
        .fallback(not_found_handler)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve the router on `listener` until `shutdown` resolves.
///
/// # Errors
/// Returns error if the server fails.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        tracing::info!("HTTP status server listening on http://{addr}");
    }
    axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
}

async fn require_loopback(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    if is_loopback(addr.ip()) {
        return next.run(request).await;
    }
    tracing::warn!(%addr, path = %request.uri().path(), "Rejected control request from non-loopback origin");
    (
        StatusCode::FORBIDDEN,
        Json(ErrorResponse::new("control is only available from loopback")),
    )
        .into_response()
}

async fn status_handler(State(state): State<AppState>) -> Json<SessionState> {
    Json(state.store.snapshot())
}

async fn keypress_handler(State(state): State<AppState>, body: Bytes) -> Response {
    let request: KeypressRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            tracing::warn!("Invalid keypress body: {e}");
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::new(format!("invalid JSON body: {e}"))),
            )
                .into_response();
        }
    };

    let outcome = state.controller.handle_key(&request.key).await;
    tracing::info!(key = %request.key, ?outcome, "Keypress");
    Json(KeypressResponse::from(outcome)).into_response()
}

async fn events_handler(State(state): State<AppState>) -> impl IntoResponse {
    Sse::new(state.store.sse_stream()).keep_alive(KeepAlive::default())
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::default())
}

async fn not_found_handler() -> StatusCode {
    StatusCode::NOT_FOUND
}
