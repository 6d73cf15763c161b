//! Request classification: pick exactly one route kind per request.

use crate::models::route::{RouteDecision, RouteKind};
use axum::http::Method;

pub const HEALTH_PATH: &str = "/health";
pub const VERSION_PATH: &str = "/version";
pub const UPLOAD_PATH: &str = "/api/r2/upload";
pub const FILE_PATH: &str = "/api/r2/file";
pub const API_PREFIX: &str = "/api/";

/// Client-side routes of the SPA. These always render the application shell.
pub const SPA_ROUTES: [&str; 8] = [
    "/production",
    "/designer",
    "/reports",
    "/users",
    "/labels",
    "/printing",
    "/login",
    "/docs",
];

/// Classify a request by method and path. First match wins.
///
/// Unknown methods on recognized paths fall through to the asset branch.
pub fn classify(method: &Method, path: &str) -> RouteDecision {
    let kind = if method == Method::OPTIONS {
        RouteKind::Preflight
    } else if path == HEALTH_PATH {
        RouteKind::Health
    } else if path == VERSION_PATH {
        RouteKind::Version
    } else if path == UPLOAD_PATH && method == Method::POST {
        RouteKind::StorageUpload
    } else if path == FILE_PATH && method == Method::GET {
        RouteKind::StorageFetch
    } else if is_spa_route(path) {
        RouteKind::KnownSpaRoute
    } else {
        RouteKind::AssetOrFallback
    };

    RouteDecision::new(kind, path)
}

pub fn is_spa_route(path: &str) -> bool {
    SPA_ROUTES.iter().any(|route| *route == path)
}
