//! HTTP handlers for the storage proxy.
//! Streams object bodies in both directions and delegates storage concerns
//! to `DiskBucket`.

use crate::{
    errors::AppError,
    models::{object::StoredObject, upload::UploadResponse},
    services::{
        bucket_service::{DiskBucket, StorageError, normalize_key},
        classifier::FILE_PATH,
    },
    state::AppState,
};
use axum::{
    Json,
    body::Body,
    extract::{FromRequest, Multipart, Query, Request},
    http::{HeaderMap, HeaderValue, StatusCode, Uri, header},
    response::{IntoResponse, Response},
};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::Deserialize;
use tokio_util::io::ReaderStream;

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Characters `encodeURIComponent` leaves alone.
const KEY_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

#[derive(Debug, Deserialize)]
pub struct KeyQuery {
    pub key: Option<String>,
}

fn bucket(state: &AppState) -> Result<&DiskBucket, AppError> {
    state
        .bucket
        .as_ref()
        .ok_or_else(|| AppError::Configuration("object storage is not configured".into()))
}

fn query_key(uri: &Uri) -> Result<String, AppError> {
    let Query(query) = Query::<KeyQuery>::try_from_uri(uri)
        .map_err(|err| AppError::Validation(err.body_text()))?;
    query
        .key
        .filter(|k| !normalize_key(k).is_empty())
        .ok_or_else(|| AppError::Validation("missing `key` query parameter".into()))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn is_multipart(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.to_ascii_lowercase().starts_with("multipart/form-data"))
}

/// `POST /api/r2/upload`
///
/// Multipart form with `file`, `key` and optional `contentType` fields, or a
/// raw body with `?key=` and the request's own content type.
pub async fn upload(state: &AppState, request: Request) -> Result<Response, AppError> {
    let bucket = bucket(state)?;
    let base = public_origin(state, request.headers());

    let stored = if is_multipart(request.headers()) {
        upload_multipart(bucket, request).await?
    } else {
        upload_raw(bucket, request).await?
    };

    tracing::info!(
        "stored `{}` ({} bytes, {})",
        stored.key,
        stored.size_bytes,
        stored.content_type.as_deref().unwrap_or(DEFAULT_CONTENT_TYPE)
    );

    let url = format!(
        "{}{}?key={}",
        base,
        FILE_PATH,
        utf8_percent_encode(&stored.key, KEY_ENCODE_SET)
    );
    Ok(Json(UploadResponse {
        success: true,
        key: stored.key,
        url,
    })
    .into_response())
}

async fn upload_multipart(bucket: &DiskBucket, request: Request) -> Result<StoredObject, AppError> {
    let mut multipart = Multipart::from_request(request, &())
        .await
        .map_err(|err| AppError::Validation(err.body_text()))?;

    let mut key = None;
    let mut explicit_type = None;
    let mut file_type = None;
    let mut staged = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::Validation(format!("malformed multipart body: {}", err)))?
    {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("file") => {
                if field.file_name().is_none() {
                    return Err(AppError::Validation("`file` must be a file part".into()));
                }
                file_type = non_empty(field.content_type().map(str::to_owned));
                staged = Some(bucket.stage(field).await?);
            }
            Some("key") => {
                if field.file_name().is_some() {
                    return Err(AppError::Validation("`key` must be a text field".into()));
                }
                key = Some(field.text().await.map_err(|err| {
                    AppError::Validation(format!("unreadable `key` field: {}", err))
                })?);
            }
            Some("contentType") => {
                explicit_type = Some(field.text().await.map_err(|err| {
                    AppError::Validation(format!("unreadable `contentType` field: {}", err))
                })?);
            }
            _ => {}
        }
    }

    let key = key
        .filter(|k| !normalize_key(k).is_empty())
        .ok_or_else(|| AppError::Validation("missing `key` field".into()))?;
    let staged = staged.ok_or_else(|| AppError::Validation("missing `file` part".into()))?;
    let content_type = non_empty(explicit_type)
        .or(file_type)
        .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.into());

    Ok(bucket.commit(staged, &key, Some(content_type)).await?)
}

async fn upload_raw(bucket: &DiskBucket, request: Request) -> Result<StoredObject, AppError> {
    let key = query_key(request.uri())?;
    let content_type = non_empty(
        request
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned),
    )
    .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.into());

    let stream = request.into_body().into_data_stream();
    Ok(bucket.put(&key, Some(content_type), stream).await?)
}

/// `GET /api/r2/file?key=`: stream a stored object back.
pub async fn fetch_file(state: &AppState, uri: &Uri) -> Result<Response, AppError> {
    let key = query_key(uri)?;
    let bucket = bucket(state)?;

    let (meta, file) = bucket
        .get(&key)
        .await?
        .ok_or_else(|| StorageError::ObjectNotFound(normalize_key(&key).to_string()))?;

    let mut response = Response::new(Body::from_stream(ReaderStream::new(file)));
    *response.status_mut() = StatusCode::OK;
    set_object_headers(response.headers_mut(), &meta);
    Ok(response)
}

fn set_object_headers(headers: &mut HeaderMap, meta: &StoredObject) {
    if let Some(value) = meta
        .content_type
        .as_deref()
        .and_then(|ct| HeaderValue::from_str(ct).ok())
    {
        headers.insert(header::CONTENT_TYPE, value);
    }

    headers.insert(
        header::CONTENT_LENGTH,
        HeaderValue::from(meta.size_bytes.max(0)),
    );

    if let Some(etag) = meta.etag.as_ref() {
        if let Ok(value) = HeaderValue::from_str(&format!("\"{}\"", etag)) {
            headers.insert(header::ETAG, value);
        }
    }

    let last_modified = meta
        .last_modified
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string();
    if let Ok(value) = HeaderValue::from_str(&last_modified) {
        headers.insert(header::LAST_MODIFIED, value);
    }
}

/// Origin for absolute URLs handed back to clients.
fn public_origin(state: &AppState, headers: &HeaderMap) -> String {
    if let Some(public) = state.config.public_url.as_deref() {
        return public.trim_end_matches('/').to_string();
    }

    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("http");
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
        .unwrap_or_else(|| state.config.addr());
    format!("{}://{}", scheme, host)
}
