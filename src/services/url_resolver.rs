//! Access-URL generation for both backends.
//!
//! This is the only place keys get percent-encoded. Route extractors decode
//! once on the way in, `encode_key` encodes once on the way out.

use crate::{
    models::grant::AccessGrant,
    services::backend::{StorageError, StorageResult},
};
use base64::{Engine as _, engine::general_purpose::URL_SAFE};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use sha1::Sha1;
use std::fmt;

type HmacSha1 = Hmac<Sha1>;

/// Lifetime of a signed private URL.
pub const SIGNED_URL_TTL_SECS: i64 = 3600;

/// Route prefix under which the filesystem backend serves its files.
pub const INTERNAL_FILES_ROUTE: &str = "/api/files";

/// Object-store key pair used for request and URL signing.
#[derive(Clone)]
pub struct Credentials {
    access_key: String,
    secret_key: String,
}

impl Credentials {
    pub fn new(access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
        }
    }

    /// `<access_key>:<urlsafe_base64(hmac_sha1(secret_key, data))>`
    pub fn sign(&self, data: &[u8]) -> StorageResult<String> {
        let mut mac = HmacSha1::new_from_slice(self.secret_key.as_bytes())
            .map_err(|err| StorageError::InvalidInput(format!("secret key: {err}")))?;
        mac.update(data);
        let digest = mac.finalize().into_bytes();
        Ok(format!("{}:{}", self.access_key, URL_SAFE.encode(digest)))
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

/// Produces the access URL appropriate to a backend.
#[derive(Clone, Debug)]
pub enum UrlResolver {
    /// Public object-store domain, signing private URLs with `credentials`.
    Domain {
        base: String,
        credentials: Credentials,
    },
    /// Route served by this process; stable, never expires.
    InternalRoute,
}

impl UrlResolver {
    pub fn domain(domain: &str, credentials: Credentials) -> Self {
        Self::Domain {
            base: normalize_domain(domain),
            credentials,
        }
    }

    /// Scheme-qualified domain, or empty for internal routes.
    pub fn base(&self) -> &str {
        match self {
            Self::Domain { base, .. } => base,
            Self::InternalRoute => "",
        }
    }

    /// URL used in listings.
    pub fn public(&self, key: &str) -> AccessGrant {
        match self {
            Self::Domain { base, .. } => AccessGrant::permanent(format!("{}/{}", base, encode_key(key))),
            Self::InternalRoute => {
                AccessGrant::permanent(format!("{}/{}", INTERNAL_FILES_ROUTE, encode_key(key)))
            }
        }
    }

    /// Time-bounded URL for private buckets, regenerated per call.
    pub fn temporary(&self, key: &str, now: DateTime<Utc>) -> StorageResult<AccessGrant> {
        match self {
            Self::Domain { credentials, .. } => {
                let expires_at = now + Duration::seconds(SIGNED_URL_TTL_SECS);
                let unsigned = format!("{}?e={}", self.public(key).url, expires_at.timestamp());
                let token = credentials.sign(unsigned.as_bytes())?;
                Ok(AccessGrant {
                    url: format!("{}&token={}", unsigned, token),
                    expires_at: Some(expires_at),
                })
            }
            Self::InternalRoute => Ok(self.public(key)),
        }
    }
}

/// Ensure a scheme (plain http when absent) and drop trailing separators.
///
/// Custom CDN domains frequently lack a matching certificate, so the
/// non-TLS scheme is the default.
pub fn normalize_domain(domain: &str) -> String {
    let domain = domain.trim();
    let qualified = if domain.starts_with("http://") || domain.starts_with("https://") {
        domain.to_string()
    } else {
        format!("http://{}", domain)
    };
    qualified.trim_end_matches('/').to_string()
}

/// Percent-encode a whole key, separators included.
pub fn encode_key(key: &str) -> String {
    urlencoding::encode(key).into_owned()
}
