//! Extension-based media helpers shared by listings and the proxy.

use std::path::Path;

pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

const AUDIO_EXTENSIONS: [&str; 6] = ["mp3", "wav", "ogg", "flac", "aac", "m4a"];

const MIME_TYPES: [(&str, &str); 16] = [
    ("mp3", "audio/mpeg"),
    ("wav", "audio/wav"),
    ("ogg", "audio/ogg"),
    ("flac", "audio/flac"),
    ("aac", "audio/aac"),
    ("m4a", "audio/mp4"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("png", "image/png"),
    ("gif", "image/gif"),
    ("svg", "image/svg+xml"),
    ("html", "text/html"),
    ("css", "text/css"),
    ("js", "application/javascript"),
    ("json", "application/json"),
    ("txt", "text/plain"),
];

/// Lowercased extension of the last path segment, if any.
fn extension(key: &str) -> Option<String> {
    Path::new(key)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
}

/// True when the key's extension is on the audio allow-list.
pub fn is_audio(key: &str) -> bool {
    extension(key)
        .map(|ext| AUDIO_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

/// Static extension → MIME lookup, falling back to an opaque binary type.
pub fn mime_for(key: &str) -> &'static str {
    extension(key)
        .and_then(|ext| {
            MIME_TYPES
                .iter()
                .find(|(candidate, _)| *candidate == ext)
                .map(|(_, mime)| *mime)
        })
        .unwrap_or(DEFAULT_MIME_TYPE)
}
