//! Backend-native listing shapes, before normalization.

/// Parameters for a single page of a backend listing.
#[derive(Clone, Debug, Default)]
pub struct ListRequest {
    pub prefix: String,
    pub limit: usize,
    /// Opaque continuation marker from a previous page.
    pub marker: Option<String>,
    /// List every key below `prefix` instead of a single level.
    pub recursive: bool,
}

impl ListRequest {
    /// One level below `prefix`, as used by the interactive API.
    pub fn level(prefix: impl Into<String>, limit: usize) -> Self {
        Self {
            prefix: prefix.into(),
            limit,
            marker: None,
            recursive: false,
        }
    }
}

/// One stored item as reported by a backend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawItem {
    pub key: String,
    pub size: u64,
    pub mime_type: Option<String>,
    pub put_time: i64,
}

impl RawItem {
    /// Zero-size keys ending in the separator are folder markers.
    pub fn is_folder_marker(&self) -> bool {
        self.key.ends_with('/') && self.size == 0
    }
}

/// One page of a backend listing.
///
/// `prefixes` carries virtual directories (object-store common prefixes) or
/// real directories (filesystem), always with a trailing `/`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RawListing {
    pub items: Vec<RawItem>,
    pub prefixes: Vec<String>,
    pub marker: Option<String>,
}
