//! Static asset serving with SPA fallback.
//!
//! Assets come from an [`AssetOrigin`] as-is; this module decides which
//! response the client gets and rewrites its headers:
//! - exact hit: content-type fixes, cache policy, preload hints, security headers
//! - miss on an extension-less path: the application shell, never cached
//! - any other miss: the origin's own failing response

use crate::services::{
    asset_origin::{AssetOrigin, ROOT_DOCUMENT},
    classifier::API_PREFIX,
};
use axum::{
    http::{HeaderMap, HeaderName, HeaderValue, header},
    response::{IntoResponse, Response},
};
use regex::Regex;
use std::{path::Path, sync::LazyLock};

pub const NO_STORE: &str = "no-store, must-revalidate";
pub const IMMUTABLE: &str = "public, max-age=31536000, immutable";

/// Bundles the shell needs first, hinted on the root document.
const PRELOAD_ASSETS: [(&str, &str); 3] = [
    ("/assets/vendor.js", "script"),
    ("/assets/index.js", "script"),
    ("/assets/index.css", "style"),
];

const SECURITY_HEADERS: [(HeaderName, &str); 4] = [
    (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
    (header::REFERRER_POLICY, "strict-origin-when-cross-origin"),
    (header::X_FRAME_OPTIONS, "DENY"),
    (header::X_XSS_PROTECTION, "1; mode=block"),
];

/// A run of 8+ hex characters right before the extension, e.g. `app.3f9a1c2b.js`.
static HASHED_ASSET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[0-9a-fA-F]{8,}\.[A-Za-z0-9]+$").expect("hashed asset pattern is valid")
});

/// How an asset request was resolved.
pub enum AssetOutcome {
    /// The exact path exists at the origin.
    Hit { path: String, response: Response },
    /// The path missed and looks like a client-side route; carries the shell.
    MissFallback(Response),
    /// The path missed and no fallback applies; carries the origin's response.
    MissFinal(Response),
}

impl IntoResponse for AssetOutcome {
    fn into_response(self) -> Response {
        match self {
            AssetOutcome::Hit { path, mut response } => {
                apply_hit_headers(&path, response.headers_mut());
                response
            }
            AssetOutcome::MissFallback(mut response) => {
                set_no_store(response.headers_mut());
                response
            }
            AssetOutcome::MissFinal(response) => response,
        }
    }
}

/// Fetch the application shell, uncached. Used for known client-side routes.
pub async fn serve_shell(origin: &dyn AssetOrigin) -> anyhow::Result<Response> {
    let mut response = origin.fetch(ROOT_DOCUMENT).await?;
    set_no_store(response.headers_mut());
    Ok(response)
}

/// Resolve `path` against the origin, falling back to the shell when it
/// looks like an unmapped client-side route.
pub async fn serve_asset(origin: &dyn AssetOrigin, path: &str) -> anyhow::Result<AssetOutcome> {
    let response = origin.fetch(path).await?;
    if response.status().is_success() {
        return Ok(AssetOutcome::Hit {
            path: path.to_string(),
            response,
        });
    }

    if is_spa_fallback_candidate(path) {
        let shell = origin.fetch(ROOT_DOCUMENT).await?;
        if shell.status().is_success() {
            tracing::debug!("no asset at {}, serving application shell", path);
            return Ok(AssetOutcome::MissFallback(shell));
        }
    }

    Ok(AssetOutcome::MissFinal(response))
}

/// Extension-less, outside the API namespace, and not the root itself.
pub fn is_spa_fallback_candidate(path: &str) -> bool {
    path != ROOT_DOCUMENT && !path.starts_with(API_PREFIX) && extension(path).is_none()
}

pub fn is_hashed_asset(path: &str) -> bool {
    HASHED_ASSET.is_match(path)
}

fn extension(path: &str) -> Option<&str> {
    Path::new(path).extension().and_then(|ext| ext.to_str())
}

/// Content types some origins get wrong for bundle files.
fn corrected_content_type(path: &str) -> Option<&'static str> {
    match extension(path) {
        Some("css") => Some("text/css; charset=utf-8"),
        Some("js") => Some("application/javascript; charset=utf-8"),
        Some("json") => Some("application/json; charset=utf-8"),
        _ => None,
    }
}

fn set_no_store(headers: &mut HeaderMap) {
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static(NO_STORE));
}

fn apply_hit_headers(path: &str, headers: &mut HeaderMap) {
    if let Some(content_type) = corrected_content_type(path) {
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    }

    let is_root = path == ROOT_DOCUMENT;
    if is_hashed_asset(path) {
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static(IMMUTABLE));
    } else if is_root || extension(path) == Some("html") {
        set_no_store(headers);
        if is_root {
            for (href, kind) in PRELOAD_ASSETS {
                let link = format!("<{}>; rel=preload; as={}", href, kind);
                if let Ok(value) = HeaderValue::from_str(&link) {
                    headers.append(header::LINK, value);
                }
            }
        }
    }

    for (name, value) in SECURITY_HEADERS {
        headers.insert(name, HeaderValue::from_static(value));
    }
}
