//! src/services/bucket_service.rs
//!
//! DiskBucket: the object bucket behind the storage routes. Payload bytes
//! live on local disk sharded beneath `base_path/{shard}/{shard}/{key}`;
//! content type, size and etag live in SQLite so the fetch route can answer
//! with headers before streaming the body.

use crate::models::object::StoredObject;
use bytes::Bytes;
use chrono::Utc;
use futures::{Stream, StreamExt, pin_mut};
use md5::Context;
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    str::FromStr,
    sync::Arc,
};
use thiserror::Error;
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::debug;
use uuid::Uuid;

const SCHEMA: &str = include_str!("../../migrations/0001_init.sql");
const MAX_OBJECT_KEY_LEN: usize = 1024;
const STAGING_DIR: &str = ".staging";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid object key: {0}")]
    InvalidObjectKey(String),
    #[error("object `{0}` not found")]
    ObjectNotFound(String),
    /// The client's body stream failed part way through.
    #[error("upload body interrupted: {0}")]
    BodyRead(io::Error),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Strip a single leading slash so `/foo.txt` and `foo.txt` address the same object.
pub fn normalize_key(raw: &str) -> &str {
    raw.strip_prefix('/').unwrap_or(raw)
}

/// An upload body that has been written to a temp file but not yet given a key.
///
/// Dropping it without calling [`DiskBucket::commit`] removes the temp file,
/// so every early return in an upload handler cleans up after itself.
#[derive(Debug)]
pub struct StagedUpload {
    path: Option<PathBuf>,
    pub size_bytes: i64,
    pub etag: String,
}

impl Drop for StagedUpload {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            match std::fs::remove_file(&path) {
                Ok(()) => debug!("discarded staged upload {}", path.display()),
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => debug!("failed to discard {}: {}", path.display(), err),
            }
        }
    }
}

/// Bucket storage: get and put by key, nothing else.
///
/// Objects are never deleted from here. Writes to an existing key replace it;
/// two concurrent writers to one key race and the last rename wins.
#[derive(Clone)]
pub struct DiskBucket {
    /// Shared SQLite connection pool used for metadata operations.
    pub db: Arc<SqlitePool>,

    /// Base directory on disk where object payloads are stored.
    pub base_path: PathBuf,
}

impl DiskBucket {
    pub fn new(db: Arc<SqlitePool>, base_path: impl Into<PathBuf>) -> Self {
        Self {
            db,
            base_path: base_path.into(),
        }
    }

    /// Open (creating if needed) the metadata database and payload directory.
    pub async fn connect(database_url: &str, base_path: impl Into<PathBuf>) -> StorageResult<Self> {
        let base_path = base_path.into();
        fs::create_dir_all(&base_path).await?;

        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let db_path = options.get_filename().to_path_buf();
        debug!("Interpreted SQLite path => {}", db_path.display());
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).await?;
                tracing::info!("Created missing directory {:?}", parent);
            }
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        Ok(Self::new(Arc::new(pool), base_path))
    }

    /// Apply the embedded schema. Safe to run repeatedly.
    pub async fn migrate(&self) -> StorageResult<()> {
        let statements = SCHEMA
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();

        debug!("Running {} migration statements...", statements.len());
        for stmt in statements {
            sqlx::query(stmt).execute(&*self.db).await?;
        }
        Ok(())
    }

    /// Reject keys that could escape the bucket root or break the file layout.
    fn ensure_key_safe(key: &str) -> StorageResult<()> {
        if key.is_empty() {
            return Err(StorageError::InvalidObjectKey("key is empty".into()));
        }
        if key.len() > MAX_OBJECT_KEY_LEN {
            return Err(StorageError::InvalidObjectKey(format!(
                "key longer than {} bytes",
                MAX_OBJECT_KEY_LEN
            )));
        }
        if key.starts_with('/') || key.ends_with('/') || key.split('/').any(|seg| seg == "..") {
            return Err(StorageError::InvalidObjectKey(format!(
                "`{}` is not a valid object path",
                key
            )));
        }
        if key.bytes().any(|b| b.is_ascii_control() || b == b'\\') {
            return Err(StorageError::InvalidObjectKey(
                "key contains control characters or backslashes".into(),
            ));
        }
        Ok(())
    }

    /// Two-level shard identifiers from MD5(key), lowercase hex.
    fn object_shards(key: &str) -> (String, String) {
        let digest = md5::compute(key);
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    /// `base_path/{shard}/{shard}/{key}`. Parent directories may not exist yet.
    fn object_path(&self, key: &str) -> PathBuf {
        let (shard_a, shard_b) = Self::object_shards(key);
        let mut path = self.base_path.clone();
        path.push(shard_a);
        path.push(shard_b);
        path.push(key);
        path
    }

    /// Pipe a body stream into a temp file, hashing and counting as it goes.
    ///
    /// Chunks are written as they arrive; the body is never held in memory.
    pub async fn stage<S, E>(&self, stream: S) -> StorageResult<StagedUpload>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let staging = self.base_path.join(STAGING_DIR);
        fs::create_dir_all(&staging).await?;
        let tmp_path = staging.join(format!(".tmp-{}", Uuid::new_v4()));
        let mut file = File::create(&tmp_path).await?;

        let mut staged = StagedUpload {
            path: Some(tmp_path),
            size_bytes: 0,
            etag: String::new(),
        };

        let mut digest = Context::new();
        pin_mut!(stream);
        while let Some(chunk_res) = stream.next().await {
            let chunk = chunk_res.map_err(|err| StorageError::BodyRead(io::Error::other(err)))?;
            staged.size_bytes += chunk.len() as i64;
            digest.consume(&chunk);
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        file.sync_all().await?;

        staged.etag = format!("{:x}", digest.compute());
        Ok(staged)
    }

    /// Move a staged body under `key` and record its metadata.
    ///
    /// Overwrites any existing object with the same key. The metadata upsert
    /// runs in a transaction that only commits once the payload is in place,
    /// so a failure leaves the previous object readable.
    pub async fn commit(
        &self,
        mut staged: StagedUpload,
        key: &str,
        content_type: Option<String>,
    ) -> StorageResult<StoredObject> {
        let key = normalize_key(key);
        Self::ensure_key_safe(key)?;

        let file_path = self.object_path(key);
        let parent = file_path.parent().map(Path::to_path_buf).ok_or_else(|| {
            StorageError::Io(io::Error::other("object path missing parent directory"))
        })?;
        fs::create_dir_all(&parent).await?;

        let tmp_path = staged
            .path
            .clone()
            .ok_or_else(|| StorageError::Io(io::Error::other("staged upload already committed")))?;

        let mut tx = self.db.begin().await?;
        let obj = sqlx::query_as::<_, StoredObject>(
            r#"
            INSERT INTO objects (id, key, content_type, size_bytes, etag, last_modified)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                content_type = excluded.content_type,
                size_bytes = excluded.size_bytes,
                etag = excluded.etag,
                last_modified = excluded.last_modified
            RETURNING id, key, content_type, size_bytes, etag, last_modified
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(key)
        .bind(content_type)
        .bind(staged.size_bytes)
        .bind(&staged.etag)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await?;

        // rename replaces the destination atomically; on error `tx` rolls back on drop
        fs::rename(&tmp_path, &file_path).await?;
        staged.path = None;

        tx.commit().await?;
        Ok(obj)
    }

    /// Stream-upload an object in one step.
    pub async fn put<S, E>(
        &self,
        key: &str,
        content_type: Option<String>,
        stream: S,
    ) -> StorageResult<StoredObject>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::ensure_key_safe(normalize_key(key))?;
        let staged = self.stage(stream).await?;
        self.commit(staged, key, content_type).await
    }

    /// Look up an object and open its payload for streaming.
    ///
    /// The file is opened before the row is read, and `size_bytes` is taken
    /// from the open handle, so the reported length always matches the bytes
    /// streamed even while another upload replaces the key.
    /// Returns `None` when the key has no metadata row or its file is gone.
    pub async fn get(&self, key: &str) -> StorageResult<Option<(StoredObject, File)>> {
        let key = normalize_key(key);
        Self::ensure_key_safe(key)?;

        let file = match File::open(self.object_path(key)).await {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(StorageError::Io(err)),
        };

        let object = sqlx::query_as::<_, StoredObject>(
            "SELECT id, key, content_type, size_bytes, etag, last_modified
             FROM objects WHERE key = ?",
        )
        .bind(key)
        .fetch_optional(&*self.db)
        .await?;

        let Some(mut object) = object else {
            debug!("payload for `{}` has no metadata row", key);
            return Ok(None);
        };
        object.size_bytes = i64::try_from(file.metadata().await?.len()).unwrap_or(i64::MAX);
        Ok(Some((object, file)))
    }
}

/// Bucket on an in-memory database rooted at `dir`, for tests.
#[cfg(test)]
pub async fn test_bucket(dir: &Path) -> DiskBucket {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    let bucket = DiskBucket::new(Arc::new(pool), dir);
    bucket.migrate().await.unwrap();
    bucket
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use tokio::io::AsyncReadExt;

    fn chunks(parts: &[&'static str]) -> impl Stream<Item = Result<Bytes, io::Error>> {
        stream::iter(
            parts
                .iter()
                .map(|p| Ok(Bytes::from_static(p.as_bytes())))
                .collect::<Vec<_>>(),
        )
    }

    async fn read_all(mut file: File) -> Vec<u8> {
        let mut buf = Vec::new();
        file.read_to_end(&mut buf).await.unwrap();
        buf
    }

    #[test]
    fn normalize_strips_one_slash() {
        assert_eq!(normalize_key("/foo.txt"), "foo.txt");
        assert_eq!(normalize_key("foo.txt"), "foo.txt");
        assert_eq!(normalize_key("//foo.txt"), "/foo.txt");
    }

    #[test]
    fn unsafe_keys_are_rejected() {
        for key in ["", "../etc/passwd", "a/../../b", "dir/", "a\\b", "a\u{0}b"] {
            assert!(
                DiskBucket::ensure_key_safe(key).is_err(),
                "accepted {:?}",
                key
            );
        }
        assert!(DiskBucket::ensure_key_safe("labels/2025/batch-7.pdf").is_ok());
        assert!(DiskBucket::ensure_key_safe("labels/batch..v2.pdf").is_ok());
        assert!(DiskBucket::ensure_key_safe("a/..b/c").is_ok());
    }

    #[tokio::test]
    async fn put_then_get_returns_bytes_and_type() {
        let dir = tempfile::tempdir().unwrap();
        let bucket = test_bucket(dir.path()).await;

        let stored = bucket
            .put(
                "labels/a.pdf",
                Some("application/pdf".into()),
                chunks(&["%PDF-", "1.7"]),
            )
            .await
            .unwrap();
        assert_eq!(stored.size_bytes, 8);
        assert_eq!(stored.etag.as_deref(), Some(format!("{:x}", md5::compute(b"%PDF-1.7")).as_str()));

        let (meta, file) = bucket.get("labels/a.pdf").await.unwrap().unwrap();
        assert_eq!(meta.content_type.as_deref(), Some("application/pdf"));
        assert_eq!(read_all(file).await, b"%PDF-1.7");
    }

    #[tokio::test]
    async fn leading_slash_addresses_same_object() {
        let dir = tempfile::tempdir().unwrap();
        let bucket = test_bucket(dir.path()).await;

        bucket
            .put("/foo.txt", Some("text/plain".into()), chunks(&["hi"]))
            .await
            .unwrap();

        assert!(bucket.get("foo.txt").await.unwrap().is_some());
        assert!(bucket.get("/foo.txt").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn second_write_replaces_first() {
        let dir = tempfile::tempdir().unwrap();
        let bucket = test_bucket(dir.path()).await;

        bucket.put("k", None, chunks(&["one"])).await.unwrap();
        bucket
            .put("k", Some("text/plain".into()), chunks(&["second"]))
            .await
            .unwrap();

        let (meta, file) = bucket.get("k").await.unwrap().unwrap();
        assert_eq!(meta.size_bytes, 6);
        assert_eq!(meta.content_type.as_deref(), Some("text/plain"));
        assert_eq!(read_all(file).await, b"second");
    }

    #[tokio::test]
    async fn missing_object_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let bucket = test_bucket(dir.path()).await;
        assert!(bucket.get("nope.png").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn dropped_stage_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let bucket = test_bucket(dir.path()).await;

        let staged = bucket.stage(chunks(&["abandoned"])).await.unwrap();
        drop(staged);

        let mut entries = fs::read_dir(dir.path().join(STAGING_DIR)).await.unwrap();
        assert!(entries.next_entry().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn failing_body_is_cleaned_up() {
        let dir = tempfile::tempdir().unwrap();
        let bucket = test_bucket(dir.path()).await;

        let body = stream::iter(vec![
            Ok(Bytes::from_static(b"partial")),
            Err(io::Error::new(ErrorKind::ConnectionReset, "client went away")),
        ]);
        let err = bucket.put("k", None, body).await.unwrap_err();
        assert!(matches!(err, StorageError::BodyRead(_)));

        let mut entries = fs::read_dir(dir.path().join(STAGING_DIR)).await.unwrap();
        assert!(entries.next_entry().await.unwrap().is_none());
        assert!(bucket.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn invalid_key_on_commit_discards_stage() {
        let dir = tempfile::tempdir().unwrap();
        let bucket = test_bucket(dir.path()).await;

        let staged = bucket.stage(chunks(&["x"])).await.unwrap();
        let err = bucket.commit(staged, "../escape", None).await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidObjectKey(_)));

        let mut entries = fs::read_dir(dir.path().join(STAGING_DIR)).await.unwrap();
        assert!(entries.next_entry().await.unwrap().is_none());
    }

    async fn file_bucket(dir: &Path) -> DiskBucket {
        let url = format!("sqlite://{}/meta/objects.db", dir.display());
        let bucket = DiskBucket::connect(&url, dir).await.unwrap();
        bucket.migrate().await.unwrap();
        bucket
    }

    #[tokio::test]
    async fn failed_overwrite_keeps_previous_object() {
        let dir = tempfile::tempdir().unwrap();
        let bucket = file_bucket(dir.path()).await;
        bucket
            .put("k", Some("text/plain".into()), chunks(&["original"]))
            .await
            .unwrap();

        let staged = bucket.stage(chunks(&["replacement"])).await.unwrap();
        bucket.db.close().await;
        assert!(bucket.commit(staged, "k", None).await.is_err());

        let reopened = file_bucket(dir.path()).await;
        let (meta, file) = reopened.get("k").await.unwrap().unwrap();
        assert_eq!(meta.content_type.as_deref(), Some("text/plain"));
        assert_eq!(meta.size_bytes, 8);
        assert_eq!(read_all(file).await, b"original");

        let mut entries = fs::read_dir(dir.path().join(STAGING_DIR)).await.unwrap();
        assert!(entries.next_entry().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn reported_size_follows_the_opened_payload() {
        let dir = tempfile::tempdir().unwrap();
        let bucket = test_bucket(dir.path()).await;
        bucket.put("k", None, chunks(&["short"])).await.unwrap();

        // payload swapped underneath a stale row
        std::fs::write(bucket.object_path("k"), "a much longer body").unwrap();

        let (meta, file) = bucket.get("k").await.unwrap().unwrap();
        assert_eq!(meta.size_bytes, 18);
        assert_eq!(read_all(file).await.len(), 18);
    }

    #[tokio::test]
    async fn dotted_names_are_storable() {
        let dir = tempfile::tempdir().unwrap();
        let bucket = test_bucket(dir.path()).await;
        bucket
            .put("labels/batch..v2.pdf", None, chunks(&["pdf"]))
            .await
            .unwrap();
        assert!(bucket.get("labels/batch..v2.pdf").await.unwrap().is_some());
    }
}
