pub mod asset_handlers;
pub mod health_handlers;
pub mod storage_handlers;
pub mod version_handlers;
