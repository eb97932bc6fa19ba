//! MIME type lookup by file extension.
//!
//! The table is built on first use and never modified afterwards, so every
//! connection task can read it without locking.

use std::collections::HashMap;
use std::sync::LazyLock;

pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

static MIME_TYPES: LazyLock<HashMap<&'static str, &'static str>> = LazyLock::new(|| {
    HashMap::from([
        ("css", "text/css"),
        ("htm", "text/html"),
        ("html", "text/html"),
        ("xml", "text/xml"),
        ("java", "text/x-java-source, text/java"),
        ("md", "text/plain"),
        ("txt", "text/plain"),
        ("asc", "text/plain"),
        ("csv", "text/csv"),
        ("gif", "image/gif"),
        ("jpg", "image/jpeg"),
        ("jpeg", "image/jpeg"),
        ("png", "image/png"),
        ("svg", "image/svg+xml"),
        ("ico", "image/x-icon"),
        ("mp3", "audio/mpeg"),
        ("m3u", "audio/mpeg-url"),
        ("mp4", "video/mp4"),
        ("ogv", "video/ogg"),
        ("flv", "video/x-flv"),
        ("mov", "video/quicktime"),
        ("swf", "application/x-shockwave-flash"),
        ("js", "application/javascript"),
        ("json", "application/json"),
        ("pdf", "application/pdf"),
        ("doc", "application/msword"),
        ("ogg", "application/x-ogg"),
        ("zip", "application/octet-stream"),
        ("exe", "application/octet-stream"),
        ("class", "application/octet-stream"),
        ("gz", "application/gzip"),
        ("wasm", "application/wasm"),
    ])
});

/// MIME type for the extension of `uri`, falling back to
/// `application/octet-stream`.
pub fn mime_type_for_file(uri: &str) -> &'static str {
    uri.rsplit_once('.')
        .and_then(|(_, ext)| MIME_TYPES.get(ext.to_ascii_lowercase().as_str()).copied())
        .unwrap_or(DEFAULT_MIME_TYPE)
}
