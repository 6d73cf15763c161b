//! Request-independent logic behind the handlers: classification, the
//! bucket and asset-origin bindings, version resolution and asset header policy.

pub mod asset_origin;
pub mod asset_service;
pub mod bucket_service;
pub mod classifier;
pub mod version_service;
