//! Local-disk backend. Keys mirror the directory tree beneath `root`
//! verbatim; size, mime and mtime are read live on every call.

use crate::{
    models::{
        entry::basename,
        raw::{ListRequest, RawItem, RawListing},
    },
    services::{
        backend::{Content, StorageBackend, StorageError, StorageResult, page_limit},
        media,
        url_resolver::{UrlResolver, encode_key},
    },
};
use async_trait::async_trait;
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde_json::json;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};
use tokio::fs::{self, File};
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};

pub struct FilesystemBackend {
    root: PathBuf,
    resolver: UrlResolver,
}

/// A directory or file found while walking the tree.
enum Found {
    Dir(String),
    File(RawItem),
}

impl Found {
    fn key(&self) -> &str {
        match self {
            Found::Dir(key) => key,
            Found::File(item) => &item.key,
        }
    }
}

impl FilesystemBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            resolver: UrlResolver::InternalRoute,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the storage root if it does not exist yet.
    pub async fn ensure_root(&self) -> io::Result<()> {
        if fs::metadata(&self.root).await.is_err() {
            fs::create_dir_all(&self.root).await?;
            tracing::info!("Created storage directory at {}", self.root.display());
        }
        Ok(())
    }

    /// Map a sanitized key onto a path beneath the root.
    fn resolve(&self, sanitized: &str) -> PathBuf {
        let mut path = self.root.clone();
        for segment in sanitized.split('/') {
            path.push(segment);
        }
        path
    }

    async fn read_item(&self, key: String, path: &Path) -> io::Result<Option<Found>> {
        let meta = fs::metadata(path).await?;
        if meta.is_dir() {
            return Ok(Some(Found::Dir(key)));
        }
        if !meta.is_file() {
            return Ok(None);
        }
        let put_time = meta
            .modified()
            .map(|t| DateTime::<Utc>::from(t).timestamp_millis())
            .unwrap_or(0);
        Ok(Some(Found::File(RawItem {
            mime_type: Some(media::mime_for(&key).to_string()),
            key,
            size: meta.len(),
            put_time,
        })))
    }

    /// Walk `scope`, one level deep or fully. Unreadable entries are skipped.
    async fn walk(&self, scope: &str, recursive: bool) -> StorageResult<Vec<Found>> {
        let mut found = Vec::new();
        let mut pending = vec![scope.to_string()];

        while let Some(current) = pending.pop() {
            let dir = self.resolve(&current);
            debug!("Reading directory {}", dir.display());
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(err) if is_missing(&err) => continue,
                Err(err) => return Err(unavailable(&dir, err)),
            };

            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|err| unavailable(&dir, err))?
            {
                let name = entry.file_name().to_string_lossy().into_owned();
                let key = if current.is_empty() {
                    name
                } else {
                    format!("{}/{}", current, name)
                };
                match self.read_item(key, &entry.path()).await {
                    Ok(Some(Found::Dir(key))) if recursive => pending.push(key),
                    Ok(Some(Found::Dir(key))) => found.push(Found::Dir(format!("{}/", key))),
                    Ok(Some(file)) => found.push(file),
                    Ok(None) => {}
                    Err(err) => warn!("Skipping unreadable entry {}: {}", entry.path().display(), err),
                }
            }
        }

        found.sort_by(|a, b| a.key().cmp(b.key()));
        Ok(found)
    }
}

#[async_trait]
impl StorageBackend for FilesystemBackend {
    fn name(&self) -> &'static str {
        "filesystem"
    }

    async fn list(&self, request: &ListRequest) -> StorageResult<RawListing> {
        let scope = sanitize_key(&request.prefix);
        let limit = page_limit(request.limit);
        let found = self.walk(&scope, request.recursive).await?;

        let mut remaining = found
            .into_iter()
            .filter(|f| match &request.marker {
                Some(marker) => f.key() > marker.as_str(),
                None => true,
            })
            .peekable();

        let mut listing = RawListing::default();
        let mut last_key = None;
        for f in remaining.by_ref().take(limit) {
            last_key = Some(f.key().to_string());
            match f {
                Found::Dir(key) => listing.prefixes.push(key),
                Found::File(item) => listing.items.push(item),
            }
        }
        if remaining.peek().is_some() {
            listing.marker = last_key;
        }
        Ok(listing)
    }

    async fn stat(&self, key: &str) -> StorageResult<RawItem> {
        let sanitized = sanitize_key(key);
        if sanitized.is_empty() {
            return Err(StorageError::InvalidInput(format!("empty key `{}`", key)));
        }
        let path = self.resolve(&sanitized);
        match self.read_item(sanitized, &path).await {
            Ok(Some(Found::File(item))) => Ok(item),
            Ok(_) => Err(StorageError::NotFound(key.to_string())),
            Err(err) if is_missing(&err) => Err(StorageError::NotFound(key.to_string())),
            Err(err) => Err(unavailable(&path, err)),
        }
    }

    async fn open_content(&self, key: &str) -> StorageResult<Content> {
        let item = self.stat(key).await?;
        let path = self.resolve(&item.key);
        debug!("Opening local file {}", path.display());
        let file = File::open(&path).await.map_err(|err| {
            if is_missing(&err) {
                StorageError::NotFound(key.to_string())
            } else {
                unavailable(&path, err)
            }
        })?;

        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static(media::mime_for(&item.key)),
        );
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(item.size));
        let disposition = format!("inline; filename=\"{}\"", encode_key(basename(&item.key)));
        if let Ok(value) = HeaderValue::from_str(&disposition) {
            headers.insert(header::CONTENT_DISPOSITION, value);
        }

        Ok(Content {
            status: StatusCode::OK,
            headers,
            body: ReaderStream::new(file).boxed(),
        })
    }

    fn resolver(&self) -> &UrlResolver {
        &self.resolver
    }

    fn debug_info(&self) -> serde_json::Value {
        json!({ "storagePath": self.root.display().to_string() })
    }
}

/// Strip `..` sequences and empty or `.` segments from a key.
///
/// Traversal attempts are rewritten rather than rejected, so the result
/// always addresses something beneath the storage root.
pub fn sanitize_key(key: &str) -> String {
    key.replace("..", "")
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}

fn is_missing(err: &io::Error) -> bool {
    matches!(err.kind(), ErrorKind::NotFound | ErrorKind::NotADirectory)
}

fn unavailable(path: &Path, err: io::Error) -> StorageError {
    StorageError::BackendUnavailable(format!("{}: {}", path.display(), err))
}
