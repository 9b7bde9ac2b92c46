//! Access URLs handed to clients.

use chrono::{DateTime, Utc};

/// A per-request access URL. Never cached or reused.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccessGrant {
    pub url: String,

    /// Signed URLs expire; internal routes do not.
    pub expires_at: Option<DateTime<Utc>>,
}

impl AccessGrant {
    pub fn permanent(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            expires_at: None,
        }
    }
}
