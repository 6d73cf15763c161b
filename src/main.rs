use anyhow::{Context, Result};
use axum::Router;
use std::{io::ErrorKind, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

mod config;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;
mod state;

use services::{asset_origin::DirectoryOrigin, bucket_service::DiskBucket};

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + migrate flag ---
    let (cfg, migrate) = config::AppConfig::from_env_and_args()?;

    tracing::info!("Starting labelworks-edge with config: {:?}", cfg);

    // --- Storage binding (optional) ---
    let bucket = match (&cfg.storage_dir, &cfg.database_url) {
        (Some(storage_dir), Some(database_url)) => {
            let bucket = DiskBucket::connect(database_url, storage_dir)
                .await
                .with_context(|| format!("opening object bucket at {}", storage_dir))?;
            bucket.migrate().await.context("applying bucket schema")?;
            tracing::info!("Object bucket ready at {}", storage_dir);
            Some(bucket)
        }
        _ => {
            tracing::warn!("No storage directory configured; /api/r2/* will answer 501");
            None
        }
    };

    // --- Handle migration mode ---
    if migrate {
        if bucket.is_none() {
            anyhow::bail!("--migrate needs a storage directory");
        }
        tracing::info!("Database migration complete.");
        return Ok(()); // exit after migration
    }

    if !std::path::Path::new(&cfg.assets_dir).is_dir() {
        tracing::warn!(
            "Assets directory {} does not exist; every asset request will miss",
            cfg.assets_dir
        );
    }
    let assets = Arc::new(DirectoryOrigin::new(&cfg.assets_dir));

    // --- Build router ---
    let app: Router = routes::routes::routes(state::AppState::new(cfg.clone(), bucket, assets));

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
