//! HTTP handlers for listing, access URLs and proxied content.
//! Content bodies are streamed straight from the backend; nothing is
//! buffered or cached on the way through.

use crate::{errors::AppError, services::storage_service::StorageService};
use axum::{
    Json,
    body::Body,
    extract::{Path, Query, State, rejection::PathRejection},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

/// Query params accepted by `GET /api/files`.
#[derive(Debug, Deserialize)]
pub struct ListFilesQuery {
    pub prefix: Option<String>,
    /// Kept as text so junk values fall back to the default page size.
    pub limit: Option<String>,
}

const DEFAULT_LIMIT: usize = 1000;

/// GET `/api/files` — one folder level, files and folders split.
pub async fn list_files(
    State(service): State<StorageService>,
    Query(q): Query<ListFilesQuery>,
) -> Result<impl IntoResponse, AppError> {
    let prefix = q.prefix.unwrap_or_default();
    let limit = q
        .limit
        .as_deref()
        .and_then(|v| v.trim().parse::<usize>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(DEFAULT_LIMIT);

    info!("Listing `{}` on {}", prefix, service.backend_name());
    let listing = service.list_files(&prefix, limit).await?;

    Ok(Json(json!({
        "success": true,
        "data": listing,
    })))
}

/// GET `/api/temp-url/{*key}` — fresh access URL for one key.
pub async fn temp_url(
    State(service): State<StorageService>,
    key: Result<Path<String>, PathRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Path(key) = key?;
    info!("Temporary URL requested for `{}`", key);
    let grant = service.temp_url(&key)?;

    let mut data = json!({
        "url": grant.url,
        "key": grant.key,
        "domain": grant.domain,
    });
    if let Some(expires_at) = grant.expires_at {
        data["expiresAt"] = json!(expires_at.timestamp());
    }

    Ok(Json(json!({
        "success": true,
        "data": data,
        "debug": service.debug_info(),
    })))
}

/// GET `/api/proxy/{*key}` and `/api/files/{*key}` — stream content.
pub async fn proxy_file(
    State(service): State<StorageService>,
    key: Result<Path<String>, PathRejection>,
) -> Result<Response, AppError> {
    let Path(key) = key?;
    info!("Proxy request for `{}`", key);
    let content = service.proxy(&key).await?;

    let mut response = Response::new(Body::from_stream(content.body));
    *response.status_mut() = content.status;
    *response.headers_mut() = content.headers;
    Ok(response)
}

/// GET `/api/proxy/`, `/api/temp-url/` and `/api/files/` with no key.
pub async fn missing_key() -> AppError {
    AppError::bad_request("file key is required")
}
