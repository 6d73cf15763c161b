use serde::Serialize;

/// Body returned by a successful upload.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct UploadResponse {
    pub success: bool,
    pub key: String,
    /// Absolute URL of the fetch route for this key.
    pub url: String,
}
