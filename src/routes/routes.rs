//! Defines routes for listing, access-URL and proxy operations.
//!
//! ## Structure
//! - **API endpoints**
//!   - `GET /api/files?prefix=&limit=` — list one folder level
//!   - `GET /api/files/{*key}`         — internal file route (filesystem URLs)
//!   - `GET /api/temp-url/{*key}`      — fresh access URL for a key
//!   - `GET /api/proxy/{*key}`         — stream content through this origin
//!
//!   The same three prefixes with an empty key answer a JSON 400.
//!
//! - **Operational endpoints**
//!   - `GET /healthz`, `GET /readyz`
//!
//! Everything else falls through to the static public directory, which
//! serves the entry page at `/`. The wildcard `*key` keeps nested keys like
//! `music/live/set.mp3` intact whether or not the slashes are encoded.

use crate::{
    handlers::{
        file_handlers::{list_files, missing_key, proxy_file, temp_url},
        health_handlers::{healthz, readyz},
    },
    services::storage_service::StorageService,
};
use axum::{Router, routing::get};
use std::path::Path;
use tower_http::services::ServeDir;

/// Build and return the router for the whole API.
///
/// The router carries shared state (`StorageService`) to all handlers.
pub fn routes(public_dir: &Path) -> Router<StorageService> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // API routes
        .route("/api/files", get(list_files))
        .route("/api/files/", get(missing_key))
        .route("/api/files/{*key}", get(proxy_file))
        .route("/api/temp-url/", get(missing_key))
        .route("/api/temp-url/{*key}", get(temp_url))
        .route("/api/proxy/", get(missing_key))
        .route("/api/proxy/{*key}", get(proxy_file))
        // Static entry page
        .fallback_service(ServeDir::new(public_dir))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::filesystem::FilesystemBackend;
    use axum::{
        body::Body,
        http::{Request, StatusCode, header},
        response::Response,
    };
    use http_body_util::BodyExt;
    use std::sync::Arc;
    use tempfile::TempDir;
    use tower::ServiceExt;

    struct Fixture {
        _dir: TempDir,
        app: Router,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let storage = dir.path().join("storage");
        let public = dir.path().join("public");
        std::fs::create_dir_all(storage.join("music")).unwrap();
        std::fs::create_dir_all(storage.join("podcasts/2024")).unwrap();
        std::fs::create_dir_all(&public).unwrap();
        std::fs::write(storage.join("music/song.mp3"), b"0123456789").unwrap();
        std::fs::write(storage.join("music/cover.png"), b"\x89PNG").unwrap();
        std::fs::write(storage.join("my song.mp3"), b"abc").unwrap();
        std::fs::write(public.join("index.html"), "<title>Library</title>").unwrap();

        let service = StorageService::new(Arc::new(FilesystemBackend::new(storage)));
        let app = routes(&public).with_state(service);
        Fixture { _dir: dir, app }
    }

    async fn send_get(app: &Router, uri: &str) -> Response {
        app.clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn body_bytes(response: Response) -> Vec<u8> {
        response
            .into_body()
            .collect()
            .await
            .unwrap()
            .to_bytes()
            .to_vec()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        serde_json::from_slice(&body_bytes(response).await).unwrap()
    }

    #[tokio::test]
    async fn lists_folder_contents() {
        let f = fixture();
        let response = send_get(&f.app, "/api/files?prefix=music").await;
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["success"], true);
        assert_eq!(json["data"]["currentPrefix"], "music");
        assert_eq!(json["data"]["folders"], serde_json::json!([]));

        let files = json["data"]["files"].as_array().unwrap();
        assert_eq!(files.len(), 2);
        let song = files.iter().find(|f| f["name"] == "song.mp3").unwrap();
        assert_eq!(song["isAudio"], true);
        assert_eq!(song["size"], 10);
        assert_eq!(song["key"], "music/song.mp3");
        assert_eq!(song["url"], "/api/files/music%2Fsong.mp3");
        let cover = files.iter().find(|f| f["name"] == "cover.png").unwrap();
        assert_eq!(cover["isAudio"], false);
    }

    #[tokio::test]
    async fn root_listing_reports_folders_once() {
        let f = fixture();
        let json = body_json(send_get(&f.app, "/api/files").await).await;
        let folders: Vec<_> = json["data"]["folders"]
            .as_array()
            .unwrap()
            .iter()
            .map(|f| f["key"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(folders, vec!["music/", "podcasts/"]);
        assert_eq!(json["data"]["folders"][0]["isFolder"], true);
        assert!(json["data"]["folders"][0].get("size").is_none());
    }

    #[tokio::test]
    async fn missing_folder_is_empty_success() {
        let f = fixture();
        let json = body_json(send_get(&f.app, "/api/files?prefix=nowhere&limit=abc").await).await;
        assert_eq!(
            json,
            serde_json::json!({
                "success": true,
                "data": {"files": [], "folders": [], "currentPrefix": "nowhere"}
            })
        );
    }

    #[tokio::test]
    async fn traversal_prefix_does_not_escape_root() {
        let f = fixture();
        let json = body_json(send_get(&f.app, "/api/files?prefix=..%2F..%2Fetc").await).await;
        assert_eq!(json["success"], true);
        assert_eq!(json["data"]["files"], serde_json::json!([]));
        assert_eq!(json["data"]["folders"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn proxy_streams_exact_bytes_with_headers() {
        let f = fixture();
        let response = send_get(&f.app, "/api/proxy/music%2Fsong.mp3").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "audio/mpeg");
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "10");
        assert_eq!(
            response.headers()[header::CACHE_CONTROL],
            "no-cache, no-store, must-revalidate"
        );
        assert_eq!(body_bytes(response).await, b"0123456789");
    }

    #[tokio::test]
    async fn internal_route_serves_listing_urls() {
        let f = fixture();
        let response = send_get(&f.app, "/api/files/music%2Fcover.png").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
    }

    #[tokio::test]
    async fn proxy_missing_key_is_json_404() {
        let f = fixture();
        let response = send_get(&f.app, "/api/proxy/music%2Fgone.mp3").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let json = body_json(response).await;
        assert_eq!(json["success"], false);
        assert!(json["message"].as_str().unwrap().contains("music/gone.mp3"));
    }

    #[tokio::test]
    async fn undecodable_key_is_json_400() {
        let f = fixture();
        for uri in ["/api/proxy/%FF.mp3", "/api/temp-url/%FF"] {
            let response = send_get(&f.app, uri).await;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");
            assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
            let json = body_json(response).await;
            assert_eq!(json["success"], false);
            assert!(json["message"].is_string());
        }
    }

    #[tokio::test]
    async fn empty_key_is_json_400() {
        let f = fixture();
        for uri in ["/api/proxy/", "/api/temp-url/", "/api/files/"] {
            let response = send_get(&f.app, uri).await;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");
            let json = body_json(response).await;
            assert_eq!(json["success"], false);
            assert_eq!(json["message"], "file key is required");
        }
    }

    #[tokio::test]
    async fn temp_url_returns_internal_route_without_expiry() {
        let f = fixture();
        let json = body_json(send_get(&f.app, "/api/temp-url/my%20song.mp3").await).await;
        assert_eq!(json["success"], true);
        assert_eq!(json["data"]["key"], "my song.mp3");
        assert_eq!(json["data"]["url"], "/api/files/my%20song.mp3");
        assert_eq!(json["data"]["domain"], "");
        assert!(json["data"].get("expiresAt").is_none());
        assert!(json["debug"]["storagePath"].is_string());

        let response = send_get(&f.app, json["data"]["url"].as_str().unwrap()).await;
        assert_eq!(body_bytes(response).await, b"abc");
    }

    #[tokio::test]
    async fn health_endpoints_report_ok() {
        let f = fixture();
        assert_eq!(send_get(&f.app, "/healthz").await.status(), StatusCode::OK);
        let response = send_get(&f.app, "/readyz").await;
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["checks"]["filesystem"]["ok"], true);
    }

    #[tokio::test]
    async fn root_serves_entry_page() {
        let f = fixture();
        let response = send_get(&f.app, "/").await;
        assert_eq!(response.status(), StatusCode::OK);
        let html = String::from_utf8(body_bytes(response).await).unwrap();
        assert!(html.contains("Library"));
    }
}
