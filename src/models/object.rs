//! Represents an object (blob) stored in the bucket.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Metadata for a single blob, addressed by its normalized key.
///
/// The payload bytes live on disk; this row carries what the fetch route
/// copies back into response headers.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct StoredObject {
    /// Internal UUID for DB indexing.
    pub id: Uuid,

    /// Object key without a leading slash (e.g. `labels/2025/batch-7.pdf`).
    pub key: String,

    /// Content type recorded at upload.
    pub content_type: Option<String>,

    /// Size in bytes.
    pub size_bytes: i64,

    /// MD5 of the payload, hex encoded.
    pub etag: Option<String>,

    /// Timestamp of the last write to this key.
    pub last_modified: DateTime<Utc>,
}
