//! Canonical listing entries returned by `GET /api/files`.

use serde::Serialize;

/// A file inside a listing.
///
/// `put_time` keeps the backend's native resolution: 100ns ticks for the
/// object store, milliseconds since the epoch for the filesystem.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    /// Basename of `key`.
    pub name: String,

    /// Full key, `/` separated.
    pub key: String,

    /// Access URL produced by the backend's resolver.
    pub url: String,

    /// Size in bytes.
    pub size: u64,

    /// Best-effort MIME type.
    pub mime_type: String,

    /// Last modification time.
    pub put_time: i64,

    /// Whether the extension is on the audio allow-list.
    pub is_audio: bool,
}

/// A (real or virtual) folder inside a listing.
///
/// Folders never carry size, mime or audio fields. The key keeps its
/// trailing separator.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FolderEntry {
    pub name: String,
    pub key: String,
    pub is_folder: bool,
}

impl FolderEntry {
    pub fn from_key(key: impl Into<String>) -> Self {
        let key = key.into();
        let name = basename(key.trim_end_matches('/')).to_string();
        Self {
            name,
            key,
            is_folder: true,
        }
    }
}

/// The normalized result of a list operation.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Listing {
    pub files: Vec<FileEntry>,
    pub folders: Vec<FolderEntry>,
    pub current_prefix: String,
}

/// Last `/`-separated segment of a key.
pub fn basename(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folder_name_strips_trailing_separator() {
        let folder = FolderEntry::from_key("music/live/");
        assert_eq!(folder.name, "live");
        assert_eq!(folder.key, "music/live/");
        assert!(folder.is_folder);
    }

    #[test]
    fn listing_serializes_with_camel_case_fields() {
        let listing = Listing {
            files: vec![FileEntry {
                name: "a.mp3".into(),
                key: "a.mp3".into(),
                url: "/api/files/a.mp3".into(),
                size: 3,
                mime_type: "audio/mpeg".into(),
                put_time: 1,
                is_audio: true,
            }],
            folders: vec![],
            current_prefix: "".into(),
        };
        let json = serde_json::to_value(&listing).unwrap();
        assert_eq!(json["currentPrefix"], "");
        assert_eq!(json["files"][0]["mimeType"], "audio/mpeg");
        assert_eq!(json["files"][0]["isAudio"], true);
        assert_eq!(json["files"][0]["putTime"], 1);
    }
}
