use crate::{services::version_service::resolve_version, state::AppState};
use axum::{
    Json,
    http::{HeaderValue, header},
    response::{IntoResponse, Response},
};

/// `GET /version`: always 200, never cacheable.
pub async fn version(state: &AppState) -> Response {
    let info = resolve_version(
        &state.config.commit,
        &state.config.version,
        state.assets.as_ref(),
    )
    .await;

    let mut response = Json(info).into_response();
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}
