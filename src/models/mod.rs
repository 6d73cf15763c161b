//! Request-scoped data models for the edge router.
//!
//! Nothing here outlives a request except `StoredObject`, which mirrors a
//! metadata row owned by the bucket.

pub mod object;
pub mod route;
pub mod upload;
pub mod version;
