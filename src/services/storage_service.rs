//! src/services/storage_service.rs
//!
//! StorageService — the single entry point route handlers talk to. It owns
//! the backend selected at startup and exposes the listing, access-URL and
//! proxy operations in backend-neutral terms.

use crate::{
    models::{entry::Listing, raw::ListRequest},
    services::{
        backend::{Content, StorageBackend, StorageResult, page_limit},
        listing,
        proxy::StreamingProxy,
    },
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::debug;

/// Signed or internal URL for a single key, as returned by `/api/temp-url`.
#[derive(Debug, Clone)]
pub struct TempUrl {
    pub url: String,
    pub key: String,
    pub domain: String,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Shared, cheaply cloneable service state.
#[derive(Clone)]
pub struct StorageService {
    backend: Arc<dyn StorageBackend>,
    proxy: StreamingProxy,
}

impl StorageService {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        let proxy = StreamingProxy::new(backend.clone());
        Self { backend, proxy }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// One normalized level beneath `prefix`.
    pub async fn list_files(&self, prefix: &str, limit: usize) -> StorageResult<Listing> {
        let request = ListRequest::level(prefix, page_limit(limit));
        let raw = self.backend.list(&request).await?;
        debug!(
            "Listed `{}`: {} items, {} prefixes",
            prefix,
            raw.items.len(),
            raw.prefixes.len()
        );
        Ok(listing::normalize(prefix, &raw, self.backend.resolver()))
    }

    /// Fresh access URL for `key`; never cached.
    pub fn temp_url(&self, key: &str) -> StorageResult<TempUrl> {
        let resolver = self.backend.resolver();
        let grant = resolver.temporary(key, Utc::now())?;
        Ok(TempUrl {
            url: grant.url,
            key: key.to_string(),
            domain: resolver.base().to_string(),
            expires_at: grant.expires_at,
        })
    }

    pub fn debug_info(&self) -> serde_json::Value {
        self.backend.debug_info()
    }

    pub async fn proxy(&self, key: &str) -> StorageResult<Content> {
        self.proxy.open(key).await
    }

    /// Cheap reachability probe used by readiness checks.
    pub async fn probe(&self) -> StorageResult<()> {
        self.backend.list(&ListRequest::level("", 1)).await.map(|_| ())
    }
}
