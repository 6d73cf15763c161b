//! Static asset and client-side route handlers.
//!
//! Errors here are origin failures; the router turns them into a generic 500.

use crate::{
    services::asset_service::{serve_asset, serve_shell},
    state::AppState,
};
use axum::response::{IntoResponse, Response};

/// A known client-side route: the application shell, whatever the path.
pub async fn spa_route(state: &AppState) -> anyhow::Result<Response> {
    serve_shell(state.assets.as_ref()).await
}

/// Exact asset, SPA fallback, or the origin's failure.
pub async fn asset(state: &AppState, path: &str) -> anyhow::Result<Response> {
    let outcome = serve_asset(state.assets.as_ref(), path).await?;
    Ok(outcome.into_response())
}
