//! Classification result for one inbound request.

/// Which handler processes a request. Exactly one is chosen per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteKind {
    /// CORS preflight, answered with an empty 204.
    Preflight,
    Health,
    Version,
    StorageUpload,
    StorageFetch,
    /// A client-side route that always renders the application shell.
    KnownSpaRoute,
    /// Try the exact static asset, then the SPA fallback.
    AssetOrFallback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteDecision {
    pub kind: RouteKind,
    /// Request path the decision was made on.
    pub path: String,
}

impl RouteDecision {
    pub fn new(kind: RouteKind, path: impl Into<String>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }
}
