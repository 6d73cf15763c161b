//! Deploy version resolution for `GET /version`.
//!
//! The environment normally supplies the commit hash and package version.
//! When either is still the unresolved placeholder, the build-time
//! `version.json` next to the static assets fills the gap. Failing to read
//! that file only degrades the answer; it never fails the request.

use crate::{
    config::UNRESOLVED,
    models::version::{BuildVersionFile, Provenance, VersionInfo},
    services::asset_origin::AssetOrigin,
};
use anyhow::{Context, bail};
use chrono::{SecondsFormat, Utc};
use tracing::warn;

pub const VERSION_FILE_PATH: &str = "/version.json";
const VERSION_FILE_LIMIT: usize = 64 * 1024;

fn is_unresolved(value: &str) -> bool {
    value.is_empty() || value == UNRESOLVED
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Build the version answer for this request.
pub async fn resolve_version(commit: &str, version: &str, origin: &dyn AssetOrigin) -> VersionInfo {
    let mut info = VersionInfo {
        commit: commit.to_string(),
        version: version.to_string(),
        time: now(),
        build_time: None,
        source: Provenance::Env,
    };

    if is_unresolved(commit) || is_unresolved(version) {
        info.source = Provenance::Fallback;
        match read_build_file(origin).await {
            Ok(file) => overlay(&mut info, file),
            Err(err) => warn!("version fallback unavailable, reporting env values: {:#}", err),
        }
        info.time = now();
    }

    info
}

async fn read_build_file(origin: &dyn AssetOrigin) -> anyhow::Result<BuildVersionFile> {
    let response = origin
        .fetch(VERSION_FILE_PATH)
        .await
        .context("fetching version.json")?;
    if !response.status().is_success() {
        bail!("version.json answered {}", response.status());
    }
    let bytes = axum::body::to_bytes(response.into_body(), VERSION_FILE_LIMIT)
        .await
        .context("reading version.json")?;
    serde_json::from_slice(&bytes).context("parsing version.json")
}

/// Copy every value the build file actually carries over the current answer.
fn overlay(info: &mut VersionInfo, file: BuildVersionFile) {
    let present = |v: Option<String>| v.filter(|s| !s.is_empty());

    if let Some(commit) = present(file.commit) {
        info.commit = commit;
    }
    if let Some(version) = present(file.version) {
        info.version = version;
    }
    info.build_time = present(file.build_time);
    info.source = file
        .source
        .as_deref()
        .and_then(Provenance::from_tag)
        .unwrap_or(Provenance::Fallback);
}
