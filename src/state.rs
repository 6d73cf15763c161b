use crate::{
    config::AppConfig,
    services::{asset_origin::AssetOrigin, bucket_service::DiskBucket},
};
use std::sync::Arc;

/// Everything a request handler may touch, passed in explicitly.
///
/// Handlers share no mutable state; the bucket and asset origin own their
/// own consistency.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    /// Object bucket binding. `None` when storage is not configured.
    pub bucket: Option<DiskBucket>,
    pub assets: Arc<dyn AssetOrigin>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        bucket: Option<DiskBucket>,
        assets: Arc<dyn AssetOrigin>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            bucket,
            assets,
        }
    }
}
