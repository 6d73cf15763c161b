//! Static-asset origin: where the built SPA bundle is fetched from.
//!
//! The router only ever asks an origin for a path and looks at the response
//! it gets back, so the post-processor and the version resolver can run
//! against a directory on disk or against a test double.

use async_trait::async_trait;
use percent_encoding::percent_decode_str;
use axum::{
    body::Body,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use std::{
    io::ErrorKind,
    path::{Component, Path, PathBuf},
};
use tokio::fs::File;
use tokio_util::io::ReaderStream;

/// Document served for `/` and for every client-side route.
pub const ROOT_DOCUMENT: &str = "/";

#[async_trait]
pub trait AssetOrigin: Send + Sync {
    /// Fetch the asset at `path`. Misses come back as non-2xx responses, not errors.
    async fn fetch(&self, path: &str) -> anyhow::Result<Response>;
}

/// Serves files from a build output directory such as `./dist`.
#[derive(Debug, Clone)]
pub struct DirectoryOrigin {
    root: PathBuf,
    index_file: String,
}

impl DirectoryOrigin {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            index_file: "index.html".into(),
        }
    }

    /// Map a request path onto a file under `root`.
    ///
    /// The path is percent-decoded first. Returns `None` for anything that
    /// would leave the root or does not decode to UTF-8.
    fn resolve(&self, path: &str) -> Option<PathBuf> {
        let decoded = percent_decode_str(path).decode_utf8().ok()?;
        let relative = decoded.trim_start_matches('/');
        let mut file_path = self.root.clone();
        for component in Path::new(relative).components() {
            match component {
                Component::Normal(part) => file_path.push(part),
                Component::CurDir => {}
                _ => return None,
            }
        }
        if relative.is_empty() || relative.ends_with('/') {
            file_path.push(&self.index_file);
        }
        Some(file_path)
    }
}

#[async_trait]
impl AssetOrigin for DirectoryOrigin {
    async fn fetch(&self, path: &str) -> anyhow::Result<Response> {
        let Some(file_path) = self.resolve(path) else {
            return Ok(not_found());
        };

        let file = match File::open(&file_path).await {
            Ok(file) => file,
            Err(err) if matches!(err.kind(), ErrorKind::NotFound | ErrorKind::NotADirectory) => {
                return Ok(not_found());
            }
            Err(err) => return Err(err.into()),
        };
        let meta = file.metadata().await?;
        if !meta.is_file() {
            return Ok(not_found());
        }

        let content_type = mime_guess::from_path(&file_path)
            .first_raw()
            .unwrap_or("application/octet-stream");

        let mut response = Response::new(Body::from_stream(ReaderStream::new(file)));
        let headers = response.headers_mut();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(meta.len()));
        Ok(response)
    }
}

fn not_found() -> Response {
    (StatusCode::NOT_FOUND, "Not Found").into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<!doctype html>").unwrap();
        std::fs::create_dir(dir.path().join("assets")).unwrap();
        std::fs::write(dir.path().join("assets/app.css"), "body{}").unwrap();
        dir
    }

    #[tokio::test]
    async fn root_serves_index() {
        let dir = site();
        let origin = DirectoryOrigin::new(dir.path());
        let resp = origin.fetch("/").await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "text/html");
        let body = axum::body::to_bytes(resp.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"<!doctype html>");
    }

    #[tokio::test]
    async fn nested_file_is_served_with_length() {
        let dir = site();
        let origin = DirectoryOrigin::new(dir.path());
        let resp = origin.fetch("/assets/app.css").await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::CONTENT_LENGTH], "6");
    }

    #[tokio::test]
    async fn misses_and_traversal_are_404() {
        let dir = site();
        let origin = DirectoryOrigin::new(dir.path().join("assets"));
        for path in [
            "/missing.png",
            "/../index.html",
            "/%2e%2e/index.html",
            "/app.css/extra",
        ] {
            let resp = origin.fetch(path).await.unwrap();
            assert_eq!(resp.status(), StatusCode::NOT_FOUND, "{}", path);
        }
    }

    #[tokio::test]
    async fn directory_without_index_is_404() {
        let dir = site();
        let origin = DirectoryOrigin::new(dir.path());
        let resp = origin.fetch("/assets").await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn encoded_path_maps_to_file_on_disk() {
        let dir = site();
        std::fs::write(dir.path().join("assets/my logo.png"), "png").unwrap();
        let origin = DirectoryOrigin::new(dir.path());
        let resp = origin.fetch("/assets/my%20logo.png").await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "image/png");
    }
}
