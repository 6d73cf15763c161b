use anyhow::{Context, Result};
use clap::Parser;
use std::env;

/// Value the deploy pipeline leaves in place when it could not resolve a
/// commit hash or package version.
pub const UNRESOLVED: &str = "unknown";

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    /// Directory holding the built SPA bundle (index.html, assets/, version.json).
    pub assets_dir: String,
    /// Root of the object bucket. `None` means no storage binding is configured.
    pub storage_dir: Option<String>,
    pub database_url: Option<String>,
    /// Absolute origin used when building upload URLs, e.g. `https://labels.example.com`.
    pub public_url: Option<String>,
    pub commit: String,
    pub version: String,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Edge router for the labelworks web app")]
pub struct Args {
    /// Host to bind to (overrides LABELWORKS_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides LABELWORKS_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory with the built static assets (overrides LABELWORKS_ASSETS_DIR)
    #[arg(long)]
    pub assets_dir: Option<String>,

    /// Directory backing the object bucket (overrides LABELWORKS_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Metadata database URL (overrides LABELWORKS_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Public origin for generated file URLs (overrides LABELWORKS_PUBLIC_URL)
    #[arg(long)]
    pub public_url: Option<String>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();
        let migrate = args.migrate;
        let cfg = Self::merge(args, |name| env::var(name).ok())?;
        Ok((cfg, migrate))
    }

    /// Merge CLI args over values looked up through `var`. Empty values count as unset.
    pub fn merge(args: Args, var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |name: &str| var(name).filter(|v| !v.trim().is_empty());

        let env_port = match var("LABELWORKS_PORT") {
            Some(value) => value
                .parse::<u16>()
                .with_context(|| format!("parsing LABELWORKS_PORT value `{}`", value))?,
            None => 8787,
        };

        let storage_dir = args.storage_dir.or_else(|| var("LABELWORKS_STORAGE_DIR"));
        let database_url = args
            .database_url
            .or_else(|| var("LABELWORKS_DATABASE_URL"))
            .or_else(|| {
                storage_dir
                    .as_ref()
                    .map(|dir| format!("sqlite://{}/meta/objects.db", dir.trim_end_matches('/')))
            });

        Ok(Self {
            host: args
                .host
                .or_else(|| var("LABELWORKS_HOST"))
                .unwrap_or_else(|| "0.0.0.0".into()),
            port: args.port.unwrap_or(env_port),
            assets_dir: args
                .assets_dir
                .or_else(|| var("LABELWORKS_ASSETS_DIR"))
                .unwrap_or_else(|| "./dist".into()),
            storage_dir,
            database_url,
            public_url: args.public_url.or_else(|| var("LABELWORKS_PUBLIC_URL")),
            commit: var("GIT_COMMIT").unwrap_or_else(|| UNRESOLVED.into()),
            version: var("APP_VERSION").unwrap_or_else(|| UNRESOLVED.into()),
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn defaults_leave_storage_unbound() {
        let cfg = AppConfig::merge(Args::default(), lookup(&[])).unwrap();
        assert_eq!(cfg.addr(), "0.0.0.0:8787");
        assert_eq!(cfg.assets_dir, "./dist");
        assert!(cfg.storage_dir.is_none());
        assert!(cfg.database_url.is_none());
        assert_eq!(cfg.commit, UNRESOLVED);
        assert_eq!(cfg.version, UNRESOLVED);
    }

    #[test]
    fn cli_overrides_env() {
        let args = Args {
            port: Some(9000),
            storage_dir: Some("/srv/cli".into()),
            ..Args::default()
        };
        let env = lookup(&[
            ("LABELWORKS_PORT", "7000"),
            ("LABELWORKS_STORAGE_DIR", "/srv/env"),
            ("GIT_COMMIT", "abc1234"),
        ]);
        let cfg = AppConfig::merge(args, env).unwrap();
        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.storage_dir.as_deref(), Some("/srv/cli"));
        assert_eq!(
            cfg.database_url.as_deref(),
            Some("sqlite:///srv/cli/meta/objects.db")
        );
        assert_eq!(cfg.commit, "abc1234");
    }

    #[test]
    fn empty_env_values_count_as_unset() {
        let env = lookup(&[("APP_VERSION", ""), ("LABELWORKS_STORAGE_DIR", "  ")]);
        let cfg = AppConfig::merge(Args::default(), env).unwrap();
        assert_eq!(cfg.version, UNRESOLVED);
        assert!(cfg.storage_dir.is_none());
    }

    #[test]
    fn bad_port_is_an_error() {
        let env = lookup(&[("LABELWORKS_PORT", "eighty")]);
        let err = AppConfig::merge(Args::default(), env).unwrap_err();
        assert!(err.to_string().contains("LABELWORKS_PORT"));
    }
}
