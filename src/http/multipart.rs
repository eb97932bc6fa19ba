//! `multipart/form-data` decoding over a staged [`BodyBuffer`].
//!
//! Decoding runs in three passes: find every boundary offset, read a bounded
//! header block after each one, then route the bytes up to the next
//! boundary either into the parameter map (plain values) or into a temp file
//! (typed parts).

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{HttpError, HttpResult};
use crate::http::body::{BodyBuffer, save_tmp_file};
use crate::http::content_type::{Charset, ContentType};
use crate::http::cursor::ByteCursor;
use crate::server::tempfile::TempFileManager;

/// Size of the sliding window used for the boundary scan, not counting the
/// bytes carried over from the previous window.
const SCAN_WINDOW: usize = 4 * 1024;

/// Upper bound on a single part's header block.
pub const MAX_PART_HEADER_SIZE: usize = 1024;

/// Bytes between the end of a part's data and the next boundary token:
/// `\r\n--`.
const BOUNDARY_PREFIX_LEN: u64 = 4;

static CONTENT_DISPOSITION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^[ \t]*content-disposition[ \t]*:(.*)$").expect("valid disposition pattern")
});

static PART_CONTENT_TYPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^[ \t]*content-type[ \t]*:(.*)$").expect("valid content-type pattern")
});

static DISPOSITION_ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"[ \t]*([a-zA-Z]*)[ \t]*=[ \t]*['"]([^"']*)['"]"#).expect("valid attribute pattern")
});

/// One part's header block, as read from the bytes after its boundary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartHeader {
    pub name: Option<String>,
    pub filename: Option<String>,
    pub content_type: Option<String>,
    /// Bytes from the boundary token to the first data byte.
    pub len: usize,
}

/// Absolute offsets of every occurrence of `boundary` in `body`.
///
/// The body is examined through a fixed-size window; the last
/// `boundary.len() - 1` bytes of each window are carried into the next one
/// so a token straddling two windows is still found exactly once.
pub fn find_boundaries(body: &mut BodyBuffer, boundary: &[u8]) -> std::io::Result<Vec<u64>> {
    let mut offsets = Vec::new();
    let blen = boundary.len();
    let total = body.len();
    if blen == 0 || total < blen as u64 {
        return Ok(offsets);
    }

    let carry_len = blen - 1;
    let mut window = vec![0u8; SCAN_WINDOW + blen];
    // Absolute offset of window[0].
    let mut base: u64 = 0;
    let mut filled = body.read_at(0, &mut window)?;

    loop {
        let mut cursor = ByteCursor::new(&window[..filled]);
        while let Some(at) = cursor.find(boundary) {
            offsets.push(base + at as u64);
            cursor.advance(at - cursor.position() + blen);
        }

        let next_read = base + filled as u64;
        if next_read >= total {
            break;
        }

        let keep = carry_len.min(filled);
        window.copy_within(filled - keep..filled, 0);
        base = next_read - keep as u64;
        let n = body.read_at(next_read, &mut window[keep..])?;
        if n == 0 {
            break;
        }
        filled = keep + n;
    }

    Ok(offsets)
}

/// Parses the header block at the start of `window`.
///
/// The first line must carry the boundary token. Lines after it are read up
/// to the first blank line. Lines may end in `\r\n` or bare `\n`; the
/// returned length counts the raw bytes of every consumed line including
/// the blank one. A block that never terminates inside the window reports a
/// length equal to the window size.
pub fn parse_part_header(window: &[u8], boundary: &str, charset: Charset) -> HttpResult<PartHeader> {
    let mut cursor = ByteCursor::new(window);
    let mut header = PartHeader::default();

    let Some(first) = next_line(&mut cursor, charset) else {
        return Err(chunk_without_boundary());
    };
    if !first.contains(boundary) {
        return Err(chunk_without_boundary());
    }

    loop {
        let Some(line) = next_line(&mut cursor, charset) else {
            // Ran out of window before the blank line.
            header.len = window.len();
            return Ok(header);
        };
        if line.trim().is_empty() {
            break;
        }

        if let Some(caps) = CONTENT_DISPOSITION.captures(&line) {
            for attr in DISPOSITION_ATTRIBUTE.captures_iter(&caps[1]) {
                let key = &attr[1];
                if key.eq_ignore_ascii_case("name") {
                    header.name = Some(attr[2].to_string());
                } else if key.eq_ignore_ascii_case("filename") {
                    header.filename = Some(attr[2].to_string());
                }
            }
        }
        if let Some(caps) = PART_CONTENT_TYPE.captures(&line) {
            header.content_type = Some(caps[1].trim().to_string());
        }
    }

    header.len = cursor.position();
    Ok(header)
}

fn chunk_without_boundary() -> HttpError {
    HttpError::malformed("Content type is multipart/form-data but chunk does not start with boundary.")
}

/// Next `\n`-terminated line without its terminator, or `None` once the
/// window is used up. A final unterminated line is consumed as-is.
fn next_line(cursor: &mut ByteCursor<'_>, charset: Charset) -> Option<String> {
    if cursor.remaining() == 0 {
        return None;
    }
    let start = cursor.position();
    let rest = cursor.rest();
    let line = match cursor.find_byte(b'\n') {
        Some(nl) => {
            let line = &rest[..nl - start];
            cursor.advance(nl - start + 1);
            line
        }
        None => {
            cursor.advance(rest.len());
            rest
        }
    };
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    Some(charset.decode(line))
}

/// First of `base`, `base1`, `base2`, ... not yet in `taken`.
fn disambiguate_filename_field(base: &str, taken: &HashSet<String>) -> String {
    if !taken.contains(base) {
        return base.to_string();
    }
    (1u32..)
        .map(|n| format!("{base}{n}"))
        .find(|candidate| !taken.contains(candidate))
        .unwrap_or_else(|| base.to_string())
}

/// First of `base`, `base2`, `base3`, ... not yet a key of `files`.
fn free_file_key(base: &str, files: &HashMap<String, String>) -> String {
    if !files.contains_key(base) {
        return base.to_string();
    }
    (2u32..)
        .map(|n| format!("{base}{n}"))
        .find(|candidate| !files.contains_key(candidate))
        .unwrap_or_else(|| base.to_string())
}

/// Decodes a multipart body into `params` and `files`.
///
/// Parts without a `Content-Type` are decoded with the outer charset and
/// stored in `params`. Typed parts are written to temp files from
/// `temp_files`; their paths go into `files` and their original filename
/// into `params`, both under the part's field name.
pub fn decode_multipart(
    content_type: &ContentType,
    body: &mut BodyBuffer,
    params: &mut HashMap<String, String>,
    files: &mut HashMap<String, String>,
    temp_files: &mut dyn TempFileManager,
) -> HttpResult<()> {
    let boundary = content_type.boundary().ok_or_else(|| {
        HttpError::malformed("Content type is multipart/form-data but boundary missing.")
    })?;
    let charset = content_type
        .charset()
        .ok_or_else(|| HttpError::internal(format!("unsupported encoding {}", content_type.encoding())))?;

    let offsets = find_boundaries(body, boundary.as_bytes())
        .map_err(|e| HttpError::internal(format!("could not scan multipart body: {e}")))?;
    if offsets.len() < 2 {
        return Err(HttpError::malformed(
            "Content type is multipart/form-data but contains less than two boundary strings.",
        ));
    }
    tracing::trace!(parts = offsets.len() - 1, "decoding multipart body");

    let mut filename_fields: HashSet<String> = HashSet::new();
    let mut header_window = vec![0u8; MAX_PART_HEADER_SIZE];

    for pair in offsets.windows(2) {
        let (start, next) = (pair[0], pair[1]);

        let n = body
            .read_at(start, &mut header_window)
            .map_err(|e| HttpError::internal(format!("could not read part header: {e}")))?;
        let header = parse_part_header(&header_window[..n], boundary, charset)?;

        if header.len + BOUNDARY_PREFIX_LEN as usize >= n {
            return Err(HttpError::internal("Multipart header size exceeds MAX_HEADER_SIZE."));
        }

        let Some(mut name) = header.name else {
            tracing::debug!(offset = start, "skipping multipart part without a field name");
            continue;
        };

        if let Some(filename) = header.filename.as_deref().filter(|f| !f.is_empty()) {
            name = disambiguate_filename_field(&name, &filename_fields);
            filename_fields.insert(name.clone());
            tracing::trace!(field = %name, filename, "multipart file part");
        }

        let data_start = start + header.len as u64;
        let data_end = next.saturating_sub(BOUNDARY_PREFIX_LEN).max(data_start);

        match header.content_type {
            None => {
                let raw = body
                    .read_range(data_start, data_end)
                    .map_err(|e| HttpError::internal(format!("could not read part data: {e}")))?;
                params.insert(name, charset.decode(&raw));
            }
            Some(_) => {
                let path = save_tmp_file(
                    body,
                    data_start,
                    data_end - data_start,
                    header.filename.as_deref(),
                    temp_files,
                )?;
                let key = free_file_key(&name, files);
                files.insert(key, path);
                params.insert(name, header.filename.unwrap_or_default());
            }
        }
    }

    Ok(())
}
