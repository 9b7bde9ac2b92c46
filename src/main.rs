use anyhow::{Context, Result};
use axum::Router;
use config::{AppConfig, BackendKind};
use services::{
    backend::StorageBackend,
    filesystem::FilesystemBackend,
    migration::{self, MigrationRunner},
    object_store::ObjectStoreBackend,
    storage_service::StorageService,
};
use std::{io::ErrorKind, path::Path, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

mod config;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Environment file (optional) ---
    let _ = dotenvy::dotenv();

    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + migrate flag ---
    let (cfg, migrate) = AppConfig::from_env_and_args()?;

    tracing::info!("Starting storage-proxy with config: {:?}", cfg);

    // --- Ensure storage directory exists ---
    let local = FilesystemBackend::new(cfg.storage_path.clone());
    local
        .ensure_root()
        .await
        .with_context(|| format!("creating storage root {}", cfg.storage_path.display()))?;

    // --- Handle migration mode ---
    if migrate {
        run_migration(&cfg).await?;
        return Ok(()); // exit after migration
    }

    // --- Initialize backend + core service ---
    let backend: Arc<dyn StorageBackend> = match cfg.backend {
        BackendKind::Filesystem => {
            tracing::info!("Serving files from {}", local.root().display());
            Arc::new(local)
        }
        BackendKind::ObjectStore => {
            cfg.object_store.validate()?;
            Arc::new(ObjectStoreBackend::new(&cfg.object_store))
        }
    };
    tracing::info!("Using {} backend", backend.name());
    let storage = StorageService::new(backend);

    // --- Build router ---
    let app: Router = routes::routes::routes(&cfg.public_dir).with_state(storage);

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

/// Copy the whole object-store bucket into the local storage root.
async fn run_migration(cfg: &AppConfig) -> Result<()> {
    cfg.object_store.validate()?;
    let source = Arc::new(ObjectStoreBackend::new(&cfg.object_store));
    let runner = MigrationRunner::new(source, cfg.storage_path.clone());

    tracing::info!(
        "Migrating bucket {} into {}",
        cfg.object_store.bucket,
        cfg.storage_path.display()
    );
    let report = runner.run().await?;

    tracing::info!(
        "Migration finished: {} total, {} succeeded, {} failed in {}s",
        report.total,
        report.succeeded,
        report.failed.len(),
        report.elapsed.as_secs()
    );

    if !report.failed.is_empty() {
        let failed_path = cfg
            .storage_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join("failed_migration.json");
        migration::write_failures(&failed_path, &report.failed)
            .await
            .with_context(|| format!("writing {}", failed_path.display()))?;
        for failed in &report.failed {
            tracing::warn!("- {}: {}", failed.key, failed.error);
        }
        tracing::warn!("Failed file list saved to {}", failed_path.display());
    }

    Ok(())
}
