//! Remote object-store backend speaking the Qiniu Kodo HTTP API.
//!
//! Listing goes to the `rsf` host, single-key metadata to the `rs` host,
//! and content is fetched from the public domain through a signed URL.

use crate::{
    config::ObjectStoreConfig,
    models::raw::{ListRequest, RawItem, RawListing},
    services::{
        backend::{Content, StorageBackend, StorageError, StorageResult, page_limit},
        url_resolver::{Credentials, UrlResolver},
    },
};
use async_trait::async_trait;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header};
use base64::{Engine as _, engine::general_purpose::URL_SAFE};
use chrono::Utc;
use futures::StreamExt;
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::json;
use std::{io, time::Duration};
use tracing::debug;

/// Time allowed for the upstream to answer a content fetch with headers.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Qiniu's "no such file or directory" status.
const STATUS_NO_SUCH_ENTRY: u16 = 612;

const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

pub struct ObjectStoreBackend {
    client: Client,
    bucket: String,
    rsf_host: String,
    rs_host: String,
    credentials: Credentials,
    resolver: UrlResolver,
    fetch_timeout: Duration,
    debug: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    marker: Option<String>,
    #[serde(rename = "commonPrefixes", default)]
    common_prefixes: Vec<String>,
    #[serde(default)]
    items: Vec<ListItem>,
}

#[derive(Debug, Deserialize)]
struct ListItem {
    key: String,
    #[serde(default)]
    fsize: u64,
    #[serde(rename = "mimeType", default)]
    mime_type: Option<String>,
    #[serde(rename = "putTime", default)]
    put_time: i64,
}

#[derive(Debug, Deserialize)]
struct StatResponse {
    #[serde(default)]
    fsize: u64,
    #[serde(rename = "mimeType", default)]
    mime_type: Option<String>,
    #[serde(rename = "putTime", default)]
    put_time: i64,
}

impl ObjectStoreBackend {
    pub fn new(cfg: &ObjectStoreConfig) -> Self {
        let credentials = Credentials::new(&cfg.access_key, &cfg.secret_key);
        let resolver = UrlResolver::domain(&cfg.domain, credentials.clone());
        let debug = json!({
            "hasAccessKey": !cfg.access_key.is_empty(),
            "hasSecretKey": !cfg.secret_key.is_empty(),
            "hasBucket": !cfg.bucket.is_empty(),
            "hasDomain": !cfg.domain.is_empty(),
            "domain": resolver.base(),
            "zone": cfg.zone.as_str(),
        });

        Self {
            client: Client::new(),
            bucket: cfg.bucket.clone(),
            rsf_host: cfg.rsf_host().trim_end_matches('/').to_string(),
            rs_host: cfg.rs_host().trim_end_matches('/').to_string(),
            credentials,
            resolver,
            fetch_timeout: FETCH_TIMEOUT,
            debug,
        }
    }

    #[cfg(test)]
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// `QBox` management token over `<path>[?<query>]\n`.
    fn authorization(&self, url: &Url) -> StorageResult<HeaderValue> {
        let mut signing = url.path().to_string();
        if let Some(query) = url.query() {
            signing.push('?');
            signing.push_str(query);
        }
        signing.push('\n');
        let token = self.credentials.sign(signing.as_bytes())?;
        HeaderValue::from_str(&format!("QBox {}", token))
            .map_err(|err| StorageError::InvalidInput(format!("authorization header: {err}")))
    }

    fn endpoint(&self, host: &str, path: &str) -> StorageResult<Url> {
        Url::parse(&format!("{}{}", host, path))
            .map_err(|err| StorageError::InvalidInput(format!("{host}{path}: {err}")))
    }
}

#[async_trait]
impl StorageBackend for ObjectStoreBackend {
    fn name(&self) -> &'static str {
        "object-store"
    }

    async fn list(&self, request: &ListRequest) -> StorageResult<RawListing> {
        let mut prefix = request.prefix.clone();
        if !request.recursive && !prefix.is_empty() && !prefix.ends_with('/') {
            prefix.push('/');
        }

        let mut url = self.endpoint(&self.rsf_host, "/list")?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("bucket", &self.bucket)
                .append_pair("prefix", &prefix)
                .append_pair("limit", &page_limit(request.limit).to_string());
            if let Some(marker) = request.marker.as_deref().filter(|m| !m.is_empty()) {
                query.append_pair("marker", marker);
            }
            if !request.recursive {
                query.append_pair("delimiter", "/");
            }
        }

        debug!("Listing bucket {} prefix `{}`", self.bucket, prefix);
        let response = self
            .client
            .post(url.clone())
            .header(header::AUTHORIZATION, self.authorization(&url)?)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .send()
            .await
            .map_err(unavailable)?;

        if !response.status().is_success() {
            return Err(StorageError::BackendUnavailable(format!(
                "list request failed: {}",
                response.status()
            )));
        }
        let body: ListResponse = response.json().await.map_err(unavailable)?;

        Ok(RawListing {
            items: body
                .items
                .into_iter()
                .map(|item| RawItem {
                    key: item.key,
                    size: item.fsize,
                    mime_type: item.mime_type,
                    put_time: item.put_time,
                })
                .collect(),
            prefixes: body.common_prefixes,
            marker: body.marker.filter(|m| !m.is_empty()),
        })
    }

    async fn stat(&self, key: &str) -> StorageResult<RawItem> {
        let entry = URL_SAFE.encode(format!("{}:{}", self.bucket, key));
        let url = self.endpoint(&self.rs_host, &format!("/stat/{}", entry))?;
        let response = self
            .client
            .get(url.clone())
            .header(header::AUTHORIZATION, self.authorization(&url)?)
            .send()
            .await
            .map_err(unavailable)?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND || status.as_u16() == STATUS_NO_SUCH_ENTRY {
            return Err(StorageError::NotFound(key.to_string()));
        }
        if !status.is_success() {
            return Err(StorageError::BackendUnavailable(format!(
                "stat request failed: {}",
                status
            )));
        }
        let body: StatResponse = response.json().await.map_err(unavailable)?;

        Ok(RawItem {
            key: key.to_string(),
            size: body.fsize,
            mime_type: body.mime_type,
            put_time: body.put_time,
        })
    }

    async fn open_content(&self, key: &str) -> StorageResult<Content> {
        let grant = self.resolver.temporary(key, Utc::now())?;
        debug!("Fetching upstream content for `{}`", key);

        let response = tokio::time::timeout(self.fetch_timeout, self.client.get(&grant.url).send())
            .await
            .map_err(|_| StorageError::Timeout(self.fetch_timeout))?
            .map_err(unavailable)?;

        let status = response.status();
        if !status.is_success() {
            return Err(StorageError::BackendUnavailable(format!(
                "upstream returned {}",
                status
            )));
        }

        let headers = passthrough_headers(response.headers());
        let body = response.bytes_stream().map(|chunk| chunk.map_err(io::Error::other));

        Ok(Content {
            status,
            headers,
            body: body.boxed(),
        })
    }

    fn resolver(&self) -> &UrlResolver {
        &self.resolver
    }

    fn debug_info(&self) -> serde_json::Value {
        self.debug.clone()
    }
}

/// Upstream headers minus the hop-by-hop set.
fn passthrough_headers(upstream: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, value) in upstream {
        if is_hop_by_hop(name) {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }
    headers
}

fn is_hop_by_hop(name: &HeaderName) -> bool {
    let name = name.as_str();
    HOP_BY_HOP.contains(&name) || name.starts_with("proxy-")
}

fn unavailable(err: reqwest::Error) -> StorageError {
    StorageError::BackendUnavailable(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Zone;
    use futures::TryStreamExt;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{header_exists, method, path, query_param, query_param_is_missing},
    };

    fn config(server: &MockServer) -> ObjectStoreConfig {
        ObjectStoreConfig {
            access_key: "ak".into(),
            secret_key: "sk".into(),
            bucket: "tunes".into(),
            domain: server.uri(),
            zone: Zone::Z0,
            rsf_host: Some(server.uri()),
            rs_host: Some(server.uri()),
        }
    }

    #[tokio::test]
    async fn list_sends_signed_single_level_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/list"))
            .and(query_param("bucket", "tunes"))
            .and(query_param("prefix", "music/"))
            .and(query_param("delimiter", "/"))
            .and(query_param("limit", "1000"))
            .and(header_exists("authorization"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "marker": "",
                "commonPrefixes": ["music/live/"],
                "items": [
                    {"key": "music/live/", "fsize": 0, "mimeType": "application/x-directory", "putTime": 1},
                    {"key": "music/song.mp3", "fsize": 10, "mimeType": "audio/mpeg", "putTime": 17000000000000000i64}
                ]
            })))
            .mount(&server)
            .await;

        let backend = ObjectStoreBackend::new(&config(&server));
        let raw = backend
            .list(&ListRequest::level("music", 5000))
            .await
            .unwrap();

        assert_eq!(raw.prefixes, vec!["music/live/".to_string()]);
        assert_eq!(raw.items.len(), 2);
        assert!(raw.items[0].is_folder_marker());
        assert_eq!(raw.items[1].size, 10);
        assert!(raw.marker.is_none());
    }

    #[tokio::test]
    async fn recursive_list_omits_delimiter_and_forwards_marker() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/list"))
            .and(query_param("marker", "page-2"))
            .and(query_param_is_missing("delimiter"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "marker": "page-3",
                "items": [{"key": "a/b/c.mp3", "fsize": 3}]
            })))
            .mount(&server)
            .await;

        let backend = ObjectStoreBackend::new(&config(&server));
        let raw = backend
            .list(&ListRequest {
                prefix: String::new(),
                limit: 1000,
                marker: Some("page-2".into()),
                recursive: true,
            })
            .await
            .unwrap();

        assert_eq!(raw.items[0].key, "a/b/c.mp3");
        assert_eq!(raw.marker.as_deref(), Some("page-3"));
    }

    #[tokio::test]
    async fn list_failure_status_is_backend_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/list"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let backend = ObjectStoreBackend::new(&config(&server));
        let err = backend.list(&ListRequest::level("", 10)).await.unwrap_err();
        assert!(matches!(err, StorageError::BackendUnavailable(_)));
    }

    #[tokio::test]
    async fn stat_maps_missing_entry_to_not_found() {
        let server = MockServer::start().await;
        let entry = URL_SAFE.encode("tunes:gone.mp3");
        Mock::given(method("GET"))
            .and(path(format!("/stat/{}", entry)))
            .respond_with(ResponseTemplate::new(612))
            .mount(&server)
            .await;

        let backend = ObjectStoreBackend::new(&config(&server));
        let err = backend.stat("gone.mp3").await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[tokio::test]
    async fn open_content_fetches_signed_url_and_drops_hop_by_hop_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/song.mp3"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "audio/mpeg")
                    .insert_header("keep-alive", "timeout=5")
                    .insert_header("etag", "\"abc\"")
                    .set_body_bytes(b"0123456789".to_vec()),
            )
            .mount(&server)
            .await;

        let backend = ObjectStoreBackend::new(&config(&server));
        let content = backend.open_content("song.mp3").await.unwrap();

        assert_eq!(content.status, StatusCode::OK);
        assert_eq!(content.headers[header::CONTENT_TYPE], "audio/mpeg");
        assert_eq!(content.headers[header::ETAG], "\"abc\"");
        assert!(content.headers.get("keep-alive").is_none());

        let chunks: Vec<_> = content.body.try_collect().await.unwrap();
        assert_eq!(chunks.concat(), b"0123456789");

        let requests = server.received_requests().await.unwrap();
        let query = requests[0].url.query().unwrap_or_default().to_string();
        assert!(query.starts_with("e="), "{query}");
        assert!(query.contains("&token=ak:"), "{query}");
    }

    #[tokio::test]
    async fn open_content_error_status_is_backend_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let backend = ObjectStoreBackend::new(&config(&server));
        let err = backend.open_content("private.mp3").await.err().unwrap();
        assert!(matches!(err, StorageError::BackendUnavailable(_)));
    }

    #[tokio::test]
    async fn slow_upstream_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let backend =
            ObjectStoreBackend::new(&config(&server)).with_fetch_timeout(Duration::from_millis(50));
        let err = backend.open_content("slow.mp3").await.err().unwrap();
        assert!(matches!(err, StorageError::Timeout(_)));
    }

    #[test]
    fn debug_info_reports_presence_flags() {
        let cfg = ObjectStoreConfig {
            access_key: "ak".into(),
            secret_key: "sk".into(),
            bucket: "tunes".into(),
            domain: "cdn.example.com".into(),
            zone: Zone::Z2,
            rsf_host: None,
            rs_host: None,
        };
        let info = ObjectStoreBackend::new(&cfg).debug_info();
        assert_eq!(info["hasAccessKey"], true);
        assert_eq!(info["domain"], "http://cdn.example.com");
        assert_eq!(info["zone"], "z2");
    }
}
