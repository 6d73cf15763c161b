//! The edge router.
//!
//! ## Structure
//! Every request lands on one dispatcher which classifies it and runs
//! exactly one handler:
//!   - `OPTIONS *`           : CORS preflight, 204
//!   - `GET  /health`        : liveness, `ok`
//!   - `GET  /version`       : deploy metadata, never cached
//!   - `POST /api/r2/upload` : store an object (multipart or raw body)
//!   - `GET  /api/r2/file`   : stream an object back
//!   - known SPA routes      : application shell, never cached
//!   - everything else       : static asset, SPA fallback, or the origin's miss
//!
//! Layers add the fixed CORS headers to every response, trace each request,
//! and turn panics into a bare 500.

use crate::{
    handlers::{
        asset_handlers::{asset, spa_route},
        health_handlers::{health, preflight},
        storage_handlers::{fetch_file, upload},
        version_handlers::version,
    },
    models::route::RouteKind,
    services::classifier::classify,
    state::AppState,
};
use axum::{
    Router,
    extract::{DefaultBodyLimit, Request, State},
    http::{HeaderValue, StatusCode, header},
    middleware,
    response::{IntoResponse, Response},
};
use std::any::Any;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};
use tracing::{debug, error};

const ALLOW_ORIGIN: &str = "*";
const ALLOW_METHODS: &str = "GET,POST,OPTIONS";
const ALLOW_HEADERS: &str = "Content-Type, Authorization";

/// Build the router with its shared state and layers applied.
pub fn routes(state: AppState) -> Router {
    Router::new()
        .fallback(dispatch)
        .with_state(state)
        // uploads stream to disk, so the extractor's 2 MB cap does not apply
        .layer(DefaultBodyLimit::disable())
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::map_response(with_cors))
}

async fn dispatch(State(state): State<AppState>, request: Request) -> Response {
    let decision = classify(request.method(), request.uri().path());
    debug!("{} {} => {:?}", request.method(), decision.path, decision.kind);

    match decision.kind {
        RouteKind::Preflight => preflight(),
        RouteKind::Health => health(),
        RouteKind::Version => version(&state).await,
        RouteKind::StorageUpload => upload(&state, request).await.into_response(),
        RouteKind::StorageFetch => fetch_file(&state, request.uri()).await.into_response(),
        RouteKind::KnownSpaRoute => spa_route(&state).await.unwrap_or_else(internal_error),
        RouteKind::AssetOrFallback => asset(&state, &decision.path)
            .await
            .unwrap_or_else(internal_error),
    }
}

/// Generic 500 for anything a handler did not anticipate. Details stay in the log.
fn internal_error(err: anyhow::Error) -> Response {
    error!("unhandled error: {:#}", err);
    plain_500()
}

fn handle_panic(payload: Box<dyn Any + Send + 'static>) -> Response {
    let detail = payload
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| payload.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic payload");
    error!("request handler panicked: {}", detail);
    plain_500()
}

fn plain_500() -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
}

async fn with_cors(mut response: Response) -> Response {
    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static(ALLOW_ORIGIN),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(ALLOW_METHODS),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(ALLOW_HEADERS),
    );
    response
}
