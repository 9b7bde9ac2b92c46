//! Turns a backend's raw page into the canonical `Listing`.
//!
//! Folder evidence arrives through two channels (zero-size marker keys and
//! prefixes); both feed one ordered set so every folder key appears once.

use crate::{
    models::{
        entry::{FileEntry, FolderEntry, Listing, basename},
        raw::{RawItem, RawListing},
    },
    services::{
        media::{self, DEFAULT_MIME_TYPE},
        url_resolver::UrlResolver,
    },
};
use std::collections::BTreeSet;

pub fn normalize(prefix: &str, raw: &RawListing, resolver: &UrlResolver) -> Listing {
    let mut files = Vec::new();
    let mut folder_keys = BTreeSet::new();

    for item in &raw.items {
        if item.is_folder_marker() {
            folder_keys.insert(item.key.clone());
        } else {
            files.push(file_entry(item, resolver));
        }
    }
    folder_keys.extend(raw.prefixes.iter().cloned());

    Listing {
        files,
        folders: folder_keys.into_iter().map(FolderEntry::from_key).collect(),
        current_prefix: prefix.to_string(),
    }
}

/// Build the file entry for one raw item, attaching its public URL.
pub fn file_entry(item: &RawItem, resolver: &UrlResolver) -> FileEntry {
    FileEntry {
        name: basename(&item.key).to_string(),
        key: item.key.clone(),
        url: resolver.public(&item.key).url,
        size: item.size,
        mime_type: item
            .mime_type
            .clone()
            .unwrap_or_else(|| DEFAULT_MIME_TYPE.to_string()),
        put_time: item.put_time,
        is_audio: media::is_audio(&item.key),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::url_resolver::Credentials;

    fn item(key: &str, size: u64) -> RawItem {
        RawItem {
            key: key.into(),
            size,
            mime_type: None,
            put_time: 0,
        }
    }

    fn resolver() -> UrlResolver {
        UrlResolver::domain("cdn.example.com", Credentials::new("ak", "sk"))
    }

    #[test]
    fn marker_and_common_prefix_collapse_to_one_folder() {
        let raw = RawListing {
            items: vec![item("a/", 0), item("b.mp3", 4)],
            prefixes: vec!["a/".into(), "c/".into()],
            marker: None,
        };
        let listing = normalize("", &raw, &resolver());

        let keys: Vec<_> = listing.folders.iter().map(|f| f.key.as_str()).collect();
        assert_eq!(keys, vec!["a/", "c/"]);
        assert_eq!(listing.folders[0].name, "a");
        assert_eq!(listing.files.len(), 1);
    }

    #[test]
    fn normalizing_twice_is_stable() {
        let raw = RawListing {
            items: vec![item("x/", 0), item("x/song.wav", 8)],
            prefixes: vec!["x/".into(), "x/".into()],
            marker: None,
        };
        let first = normalize("x/", &raw, &resolver());
        let second = normalize("x/", &raw, &resolver());
        assert_eq!(first, second);
        assert_eq!(first.folders.len(), 1);
    }

    #[test]
    fn non_empty_key_with_trailing_separator_is_a_file() {
        let raw = RawListing {
            items: vec![item("odd/", 12)],
            ..Default::default()
        };
        let listing = normalize("", &raw, &resolver());
        assert!(listing.folders.is_empty());
        assert_eq!(listing.files[0].key, "odd/");
    }

    #[test]
    fn file_entries_carry_url_mime_and_audio_flag() {
        let entry = file_entry(&item("live set/a.FLAC", 3), &resolver());
        assert_eq!(entry.name, "a.FLAC");
        assert_eq!(entry.url, "http://cdn.example.com/live%20set%2Fa.FLAC");
        assert_eq!(entry.mime_type, DEFAULT_MIME_TYPE);
        assert!(entry.is_audio);

        let entry = file_entry(&item("cover.png", 3), &UrlResolver::InternalRoute);
        assert_eq!(entry.url, "/api/files/cover.png");
        assert!(!entry.is_audio);
    }
}
