//! The storage capability both backends implement.
//!
//! Route handlers and the proxy only ever see `dyn StorageBackend`; anything
//! backend-specific stays inside the implementations.

use crate::{
    models::raw::{ListRequest, RawItem, RawListing},
    services::url_resolver::UrlResolver,
};
use async_trait::async_trait;
use axum::http::{HeaderMap, StatusCode};
use bytes::Bytes;
use futures::stream::BoxStream;
use std::{io, time::Duration};
use thiserror::Error;

/// Largest page a single list call may return.
pub const PAGE_MAX: usize = 1000;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),
    #[error("`{0}` not found")]
    NotFound(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("upstream did not respond within {0:?}")]
    Timeout(Duration),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

pub type ByteStream = BoxStream<'static, io::Result<Bytes>>;

/// Opened content ready to be streamed to a client.
pub struct Content {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: ByteStream,
}

#[async_trait]
pub trait StorageBackend: Send + Sync + 'static {
    /// Short identifier used in logs and debug output.
    fn name(&self) -> &'static str;

    /// One page of entries under `request.prefix`.
    ///
    /// A prefix with nothing behind it yields an empty page, not an error.
    async fn list(&self, request: &ListRequest) -> StorageResult<RawListing>;

    /// Metadata for a single key.
    async fn stat(&self, key: &str) -> StorageResult<RawItem>;

    /// Open a key for streaming. Dropping the returned body releases the
    /// underlying file descriptor or socket.
    async fn open_content(&self, key: &str) -> StorageResult<Content>;

    fn resolver(&self) -> &UrlResolver;

    /// Configuration hints surfaced by `/api/temp-url`.
    fn debug_info(&self) -> serde_json::Value;
}

/// Clamp a requested page size to `1..=PAGE_MAX`.
pub fn page_limit(limit: usize) -> usize {
    limit.clamp(1, PAGE_MAX)
}
