//! Same-origin streaming proxy.
//!
//! Each request moves through `Idle → Opening → Streaming` and ends in
//! exactly one of `Completed`, `Aborted` or `Failed`. The upstream body is
//! owned by the response stream, so whichever way the request ends the
//! body is dropped once and its socket or descriptor closes with it.

use crate::services::backend::{ByteStream, Content, StorageBackend, StorageResult};
use axum::http::{HeaderMap, HeaderValue, header};
use futures::{StreamExt, stream};
use std::{io, sync::Arc, time::Duration};
use tracing::{debug, info, warn};

/// Longest silence tolerated from the upstream while streaming.
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProxyState {
    Idle,
    Opening,
    Streaming,
    Completed,
    Aborted,
    Failed,
}

#[derive(Clone)]
pub struct StreamingProxy {
    backend: Arc<dyn StorageBackend>,
    idle_timeout: Duration,
}

impl StreamingProxy {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            backend,
            idle_timeout: IDLE_TIMEOUT,
        }
    }

    /// Open `key` and wrap its body for streaming to a client.
    pub async fn open(&self, key: &str) -> StorageResult<Content> {
        let mut tracker = Tracker::new(key);
        tracker.advance(ProxyState::Opening);

        let content = match self.backend.open_content(key).await {
            Ok(content) => content,
            Err(err) => {
                warn!("Proxy open failed for `{}` on {}: {}", key, self.backend.name(), err);
                tracker.advance(ProxyState::Failed);
                return Err(err);
            }
        };

        let mut headers = content.headers;
        force_no_cache(&mut headers);
        tracker.advance(ProxyState::Streaming);

        Ok(Content {
            status: content.status,
            headers,
            body: guard_stream(tracker, content.body, self.idle_timeout),
        })
    }
}

/// Per-request bookkeeping; owned by the response stream once streaming.
struct Tracker {
    key: String,
    state: ProxyState,
    bytes: u64,
}

impl Tracker {
    fn new(key: &str) -> Self {
        Self {
            key: key.to_string(),
            state: ProxyState::Idle,
            bytes: 0,
        }
    }

    fn advance(&mut self, next: ProxyState) {
        debug!("proxy `{}`: {:?} -> {:?}", self.key, self.state, next);
        self.state = next;
    }
}

impl Drop for Tracker {
    fn drop(&mut self) {
        // Dropped mid-stream means hyper discarded the body: the client left.
        if self.state == ProxyState::Streaming {
            self.advance(ProxyState::Aborted);
            info!(
                "Client aborted `{}` after {} bytes; upstream released",
                self.key, self.bytes
            );
        }
    }
}

/// Stream `body`, ending with an error if the upstream goes quiet for
/// longer than `idle_timeout`. Terminal states drop the upstream at once.
fn guard_stream(tracker: Tracker, body: ByteStream, idle_timeout: Duration) -> ByteStream {
    stream::unfold(Some((body, tracker)), move |state| async move {
        let (mut body, mut tracker) = state?;
        match tokio::time::timeout(idle_timeout, body.next()).await {
            Ok(Some(Ok(chunk))) => {
                tracker.bytes += chunk.len() as u64;
                Some((Ok(chunk), Some((body, tracker))))
            }
            Ok(Some(Err(err))) => {
                warn!("Upstream read failed for `{}`: {}", tracker.key, err);
                tracker.advance(ProxyState::Failed);
                Some((Err(err), None))
            }
            Ok(None) => {
                tracker.advance(ProxyState::Completed);
                debug!("Streamed {} bytes for `{}`", tracker.bytes, tracker.key);
                None
            }
            Err(_) => {
                warn!("Upstream idle for {:?} on `{}`", idle_timeout, tracker.key);
                tracker.advance(ProxyState::Aborted);
                Some((
                    Err(io::Error::new(io::ErrorKind::TimedOut, "upstream idle timeout")),
                    None,
                ))
            }
        }
    })
    .boxed()
}

/// Proxied content is never cached by the browser.
fn force_no_cache(headers: &mut HeaderMap) {
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-cache, no-store, must-revalidate"),
    );
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(header::EXPIRES, HeaderValue::from_static("0"));
}
