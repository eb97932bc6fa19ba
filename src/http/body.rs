//! Request body staging and decoding.
//!
//! The body is first pulled off the socket into a [`BodyBuffer`]: small
//! bodies stay in memory, larger ones go to a request-scoped temp file. Both
//! variants are addressed by absolute offset, so the form and multipart
//! decoders do not care where the bytes live.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::time::Duration;

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};

use crate::error::{HttpError, HttpResult};
use crate::http::multipart;
use crate::http::parser::decode_query_into;
use crate::http::request::{Method, Request};
use crate::server::tempfile::TempFileManager;

/// Bodies smaller than this are kept in memory.
pub const MEMORY_STORE_LIMIT: usize = 1024;

/// Files-map key for a raw (non-form) POST payload.
pub const POST_DATA_KEY: &str = "postData";

/// Files-map key for the temp file holding a PUT body.
pub const PUT_CONTENT_KEY: &str = "content";

const REQUEST_BUFFER_LEN: usize = 512;
const COPY_BUFFER_LEN: usize = 8192;

/// A fully received request body.
#[derive(Debug)]
pub enum BodyBuffer {
    Memory(Vec<u8>),
    Disk { file: File, len: u64 },
}

impl BodyBuffer {
    pub fn len(&self) -> u64 {
        match self {
            BodyBuffer::Memory(data) => data.len() as u64,
            BodyBuffer::Disk { len, .. } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_on_disk(&self) -> bool {
        matches!(self, BodyBuffer::Disk { .. })
    }

    /// Fills `buf` from `offset`, stopping early only at the end of the body.
    pub fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> std::io::Result<usize> {
        let len = self.len();
        if offset >= len {
            return Ok(0);
        }
        let want = ((len - offset) as usize).min(buf.len());

        match self {
            BodyBuffer::Memory(data) => {
                let start = offset as usize;
                buf[..want].copy_from_slice(&data[start..start + want]);
                Ok(want)
            }
            BodyBuffer::Disk { file, .. } => {
                file.seek(SeekFrom::Start(offset))?;
                file.read_exact(&mut buf[..want])?;
                Ok(want)
            }
        }
    }

    /// Copies the bytes in `start..end` out of the body.
    pub fn read_range(&mut self, start: u64, end: u64) -> std::io::Result<Vec<u8>> {
        let end = end.min(self.len());
        if start >= end {
            return Ok(Vec::new());
        }
        let mut out = vec![0u8; (end - start) as usize];
        let n = self.read_at(start, &mut out)?;
        out.truncate(n);
        Ok(out)
    }

    /// Streams `len` bytes starting at `offset` into `sink`.
    pub fn copy_range_to(&mut self, offset: u64, len: u64, sink: &mut impl Write) -> std::io::Result<()> {
        let mut buf = vec![0u8; COPY_BUFFER_LEN];
        let mut pos = offset;
        let end = offset.saturating_add(len).min(self.len());
        while pos < end {
            let want = ((end - pos) as usize).min(buf.len());
            let n = self.read_at(pos, &mut buf[..want])?;
            if n == 0 {
                break;
            }
            sink.write_all(&buf[..n])?;
            pos += n as u64;
        }
        sink.flush()
    }
}

/// Body length: `Content-Length` when present, otherwise whatever arrived
/// together with the head.
pub fn body_size(request: &Request, carried: usize) -> HttpResult<u64> {
    match request.content_length() {
        Some(Ok(len)) => Ok(len),
        Some(Err(_)) => Err(HttpError::malformed(format!(
            "Invalid Content-Length: {}",
            request.header("content-length").unwrap_or_default()
        ))),
        None => Ok(carried as u64),
    }
}

async fn read_some<R>(stream: &mut R, buf: &mut [u8], read_timeout: Duration) -> HttpResult<usize>
where
    R: AsyncRead + Unpin,
{
    match tokio::time::timeout(read_timeout, stream.read(buf)).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(HttpError::Io(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            "timed out reading request body",
        ))),
    }
}

/// Reads `size` body bytes, taking the bytes already buffered with the head
/// first and the socket after that.
///
/// Bodies under `memory_threshold` are kept in memory; larger ones are
/// written to a temp file from `temp_files`. A peer that closes early leaves
/// a short body rather than an error.
pub async fn read_body<R>(
    carried: &mut BytesMut,
    stream: &mut R,
    size: u64,
    memory_threshold: usize,
    read_timeout: Duration,
    temp_files: &mut dyn TempFileManager,
) -> HttpResult<BodyBuffer>
where
    R: AsyncRead + Unpin,
{
    let mut staging = if size >= memory_threshold as u64 {
        let handle = temp_files
            .create_temp_file(None)
            .map_err(|e| HttpError::internal(format!("could not create body spill file: {e}")))?;
        Staging::Disk {
            path: handle.path,
            file: tokio::fs::File::from_std(handle.file),
        }
    } else {
        Staging::Memory(Vec::with_capacity(size as usize))
    };

    let mut remaining = size;

    let from_head = carried.len().min(remaining as usize);
    if from_head > 0 {
        staging.write(&carried[..from_head]).await?;
        carried.advance(from_head);
        remaining -= from_head as u64;
    }

    let mut buf = [0u8; REQUEST_BUFFER_LEN];
    while remaining > 0 {
        let want = remaining.min(REQUEST_BUFFER_LEN as u64) as usize;
        let n = read_some(stream, &mut buf[..want], read_timeout).await?;
        if n == 0 {
            tracing::debug!(missing = remaining, "peer closed before the full body arrived");
            break;
        }
        staging.write(&buf[..n]).await?;
        remaining -= n as u64;
    }

    staging.finish().await
}

enum Staging {
    Memory(Vec<u8>),
    Disk { path: PathBuf, file: tokio::fs::File },
}

impl Staging {
    async fn write(&mut self, bytes: &[u8]) -> HttpResult<()> {
        match self {
            Staging::Memory(data) => {
                data.extend_from_slice(bytes);
                Ok(())
            }
            Staging::Disk { file, .. } => file
                .write_all(bytes)
                .await
                .map_err(|e| HttpError::internal(format!("could not write body spill file: {e}"))),
        }
    }

    /// Hands back a read handle; the multipart pass reads it synchronously.
    async fn finish(self) -> HttpResult<BodyBuffer> {
        match self {
            Staging::Memory(data) => Ok(BodyBuffer::Memory(data)),
            Staging::Disk { path, mut file } => {
                file.flush()
                    .await
                    .map_err(|e| HttpError::internal(format!("could not flush body spill file: {e}")))?;
                drop(file);

                let file = tokio::fs::File::open(&path)
                    .await
                    .map_err(|e| HttpError::internal(format!("could not reopen body spill file: {e}")))?;
                let len = file
                    .metadata()
                    .await
                    .map_err(|e| HttpError::internal(format!("could not stat body spill file: {e}")))?
                    .len();
                tracing::trace!(path = %path.display(), len, "request body spilled to disk");
                Ok(BodyBuffer::Disk {
                    file: file.into_std().await,
                    len,
                })
            }
        }
    }
}

/// Reads and drops `size` body bytes so the next request on the connection
/// starts at the right place.
pub async fn discard_body<R>(
    carried: &mut BytesMut,
    stream: &mut R,
    size: u64,
    read_timeout: Duration,
) -> HttpResult<()>
where
    R: AsyncRead + Unpin,
{
    let from_head = carried.len().min(size as usize);
    carried.advance(from_head);
    let mut remaining = size - from_head as u64;

    let mut buf = [0u8; REQUEST_BUFFER_LEN];
    while remaining > 0 {
        let want = remaining.min(REQUEST_BUFFER_LEN as u64) as usize;
        let n = read_some(stream, &mut buf[..want], read_timeout).await?;
        if n == 0 {
            break;
        }
        remaining -= n as u64;
    }
    Ok(())
}

/// Copies `len` bytes at `offset` into a new temp file and returns its path.
///
/// An empty range creates nothing and yields an empty path.
pub fn save_tmp_file(
    body: &mut BodyBuffer,
    offset: u64,
    len: u64,
    name_hint: Option<&str>,
    temp_files: &mut dyn TempFileManager,
) -> HttpResult<String> {
    if len == 0 {
        return Ok(String::new());
    }
    let mut handle = temp_files
        .create_temp_file(name_hint)
        .map_err(|e| HttpError::internal(format!("could not create temp file: {e}")))?;
    body.copy_range_to(offset, len, &mut handle.file)
        .map_err(|e| HttpError::internal(format!("could not write temp file: {e}")))?;
    Ok(handle.path.to_string_lossy().into_owned())
}

/// Decodes a staged body into the request's parameter and file maps.
///
/// * POST `multipart/form-data`: text parts become parameters, typed parts
///   become temp files.
/// * POST `application/x-www-form-urlencoded`: merged into the parameters.
/// * any other POST with a non-empty body: the text goes under `postData`
///   in the files map.
/// * PUT: the body is saved to a temp file recorded under `content`.
pub fn decode_body(
    request: &mut Request,
    body: &mut BodyBuffer,
    temp_files: &mut dyn TempFileManager,
) -> HttpResult<()> {
    match request.method {
        Method::POST => {
            let content_type = request.content_type();
            if content_type.is_multipart() {
                if content_type.boundary().is_none() {
                    return Err(HttpError::malformed(
                        "Content type is multipart/form-data but boundary missing. Usage: GET /example/file.html",
                    ));
                }
                return multipart::decode_multipart(
                    &content_type,
                    body,
                    &mut request.params,
                    &mut request.files,
                    temp_files,
                );
            }

            let charset = content_type.charset().ok_or_else(|| {
                HttpError::internal(format!("unsupported encoding {}", content_type.encoding()))
            })?;
            let raw = body
                .read_range(0, body.len())
                .map_err(|e| HttpError::internal(format!("could not read request body: {e}")))?;
            let text = charset.decode(&raw);
            let post_line = text.trim();

            if content_type.is_form_urlencoded() {
                decode_query_into(post_line, &mut request.params);
            } else if !post_line.is_empty() {
                request
                    .files
                    .insert(POST_DATA_KEY.to_string(), post_line.to_string());
            }
        }
        Method::PUT => {
            let len = body.len();
            let path = save_tmp_file(body, 0, len, None, temp_files)?;
            request.files.insert(PUT_CONTENT_KEY.to_string(), path);
        }
        _ => {}
    }
    Ok(())
}
