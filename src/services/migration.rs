//! Bulk copy of every file in one backend into a local storage root.
//!
//! A batch client of the same listing/content contract the HTTP API uses:
//! pages through the source with markers, then streams each file to disk
//! through a temporary file and an atomic rename. Failures are recorded per
//! file and never retried.

use crate::{
    models::raw::ListRequest,
    services::{
        backend::{PAGE_MAX, StorageBackend, StorageError, StorageResult},
        filesystem::sanitize_key,
        proxy::IDLE_TIMEOUT,
    },
};
use futures::StreamExt;
use serde::Serialize;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::{info, warn};

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct FailedFile {
    pub key: String,
    pub error: String,
}

#[derive(Debug, Default)]
pub struct MigrationReport {
    pub total: usize,
    pub succeeded: usize,
    pub failed: Vec<FailedFile>,
    pub elapsed: Duration,
}

pub struct MigrationRunner {
    source: Arc<dyn StorageBackend>,
    dest_root: PathBuf,
    idle_timeout: Duration,
}

impl MigrationRunner {
    pub fn new(source: Arc<dyn StorageBackend>, dest_root: impl Into<PathBuf>) -> Self {
        Self {
            source,
            dest_root: dest_root.into(),
            idle_timeout: IDLE_TIMEOUT,
        }
    }

    pub async fn run(&self) -> StorageResult<MigrationReport> {
        let started = Instant::now();
        fs::create_dir_all(&self.dest_root).await?;

        let keys = self.collect_keys().await?;
        info!("Found {} files to migrate from {}", keys.len(), self.source.name());

        let mut report = MigrationReport {
            total: keys.len(),
            ..Default::default()
        };
        for key in keys {
            match self.copy_one(&key).await {
                Ok(bytes) => {
                    info!("Migrated {} ({} bytes)", key, bytes);
                    report.succeeded += 1;
                }
                Err(err) => {
                    warn!("Failed to migrate {}: {}", key, err);
                    report.failed.push(FailedFile {
                        key,
                        error: err.to_string(),
                    });
                }
            }
        }

        report.elapsed = started.elapsed();
        Ok(report)
    }

    /// Every file key in the source, following continuation markers.
    async fn collect_keys(&self) -> StorageResult<Vec<String>> {
        let mut keys = Vec::new();
        let mut request = ListRequest {
            prefix: String::new(),
            limit: PAGE_MAX,
            marker: None,
            recursive: true,
        };
        let mut page = 1;

        loop {
            let listing = self.source.list(&request).await?;
            info!("Fetched page {} with {} items", page, listing.items.len());
            keys.extend(
                listing
                    .items
                    .into_iter()
                    .filter(|item| !item.key.ends_with('/'))
                    .map(|item| item.key),
            );
            match listing.marker {
                Some(marker) => request.marker = Some(marker),
                None => break,
            }
            page += 1;
        }

        Ok(keys)
    }

    fn destination(&self, key: &str) -> StorageResult<PathBuf> {
        let relative = sanitize_key(key);
        if relative.is_empty() {
            return Err(StorageError::InvalidInput(format!("empty key `{}`", key)));
        }
        let mut path = self.dest_root.clone();
        path.extend(relative.split('/'));
        Ok(path)
    }

    async fn copy_one(&self, key: &str) -> StorageResult<u64> {
        let dest = self.destination(key)?;
        let parent = dest.parent().map(Path::to_path_buf).ok_or_else(|| {
            StorageError::Io(io::Error::new(ErrorKind::Other, "destination has no parent"))
        })?;
        fs::create_dir_all(&parent).await?;

        let content = self.source.open_content(key).await?;
        let file_name = dest
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let tmp_path = parent.join(format!(".{}.part", file_name));
        let mut file = File::create(&tmp_path).await?;

        let mut body = content.body;
        let mut written: u64 = 0;
        loop {
            let next = match tokio::time::timeout(self.idle_timeout, body.next()).await {
                Ok(next) => next,
                Err(_) => {
                    let _ = fs::remove_file(&tmp_path).await;
                    return Err(StorageError::Timeout(self.idle_timeout));
                }
            };
            let chunk = match next {
                Some(Ok(chunk)) => chunk,
                Some(Err(err)) => {
                    let _ = fs::remove_file(&tmp_path).await;
                    return Err(StorageError::Io(err));
                }
                None => break,
            };
            if let Err(err) = file.write_all(&chunk).await {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(StorageError::Io(err));
            }
            written += chunk.len() as u64;
        }
        if let Err(err) = file.sync_all().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StorageError::Io(err));
        }
        drop(file);

        if let Err(err) = fs::rename(&tmp_path, &dest).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StorageError::Io(err));
        }
        Ok(written)
    }
}

/// Persist the failed-file list as pretty JSON.
pub async fn write_failures(path: &Path, failed: &[FailedFile]) -> io::Result<()> {
    let json = serde_json::to_vec_pretty(failed).map_err(io::Error::other)?;
    fs::write(path, json).await
}
