//! Deploy version metadata reported by `GET /version`.

use serde::{Deserialize, Serialize};

/// Where the version values came from.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Provenance {
    /// Both values were supplied by the runtime environment.
    Env,
    /// The environment was incomplete; values were patched from `version.json`.
    Fallback,
    /// `version.json` as generated by the build.
    BuildTime,
}

impl Provenance {
    /// Parse a provenance tag as written in `version.json`.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "env" => Some(Self::Env),
            "fallback" => Some(Self::Fallback),
            "build-time" => Some(Self::BuildTime),
            _ => None,
        }
    }
}

/// Response body of the version route.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VersionInfo {
    pub commit: String,
    pub version: String,
    /// Time the request was answered (RFC 3339).
    pub time: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build_time: Option<String>,
    pub source: Provenance,
}

/// Schema of the build-time `version.json` placed next to the static assets.
///
/// Every field is optional on read so a partially written file still
/// contributes whatever it has.
#[derive(Deserialize, Serialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct BuildVersionFile {
    pub version: Option<String>,
    pub commit: Option<String>,
    pub build_time: Option<String>,
    pub source: Option<String>,
}
