use std::io::Write;

use flate2::Compression;
use flate2::write::GzEncoder;
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::http::chunked::ChunkedWriter;
use crate::http::cookie::http_time;
use crate::http::request::Method;
use crate::http::response::Response;

const HTTP_VERSION: &str = "HTTP/1.1";

/// Read size when pumping a body source onto the wire.
const BODY_BUFFER_SIZE: usize = 16 * 1024;

/// How the body is delimited on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// `Content-Length: n`, then at most `n` raw bytes.
    FixedLength(u64),
    /// `Transfer-Encoding: chunked`.
    Chunked,
    /// `Content-Encoding: gzip` over chunked transfer.
    GzipChunked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterState {
    HeadersPending,
    FramingDecided(Framing),
    BodyTransfer(Framing),
    Closed,
}

/// Picks the framing for a response. Evaluated once, before any byte is
/// written.
///
/// 1. An explicit `Content-Length` header wins and turns gzip off.
/// 2. Negotiated gzip forces chunked transfer.
/// 3. An unknown length (or an explicit chunked request) is chunked.
/// 4. Otherwise the known length is sent as `Content-Length`.
pub fn decide_framing(resp: &Response) -> Framing {
    if let Some(declared) = resp.header("content-length") {
        let len = match declared.trim().parse::<u64>() {
            Ok(len) => len,
            Err(_) => {
                tracing::error!(value = declared, "content-length was no number");
                resp.content_length.unwrap_or(0)
            }
        };
        return Framing::FixedLength(len);
    }

    if resp.gzip {
        return Framing::GzipChunked;
    }

    match resp.content_length {
        Some(len) if !resp.chunked => Framing::FixedLength(len),
        _ => Framing::Chunked,
    }
}

fn push_header(buf: &mut Vec<u8>, key: &str, value: &str) {
    buf.extend_from_slice(key.as_bytes());
    buf.extend_from_slice(b": ");
    buf.extend_from_slice(value.as_bytes());
    buf.extend_from_slice(b"\r\n");
}

fn serialize_head(resp: &Response, framing: Framing) -> Vec<u8> {
    let mut buf = Vec::new();

    // Status line
    let status_line = format!(
        "{} {} {}\r\n",
        HTTP_VERSION,
        resp.status.as_u16(),
        resp.status.reason_phrase()
    );
    buf.extend_from_slice(status_line.as_bytes());

    if let Some(mime) = &resp.mime_type {
        push_header(&mut buf, "Content-Type", mime);
    }
    if !resp.headers.contains("date") {
        push_header(&mut buf, "Date", &http_time(0));
    }

    for (k, v) in resp.headers.iter() {
        push_header(&mut buf, k, v);
    }

    if !resp.headers.contains("connection") {
        let value = if resp.keep_alive { "keep-alive" } else { "close" };
        push_header(&mut buf, "Connection", value);
    }

    match framing {
        Framing::FixedLength(len) => {
            if !resp.headers.contains("content-length") {
                push_header(&mut buf, "Content-Length", &len.to_string());
            }
        }
        Framing::Chunked => push_header(&mut buf, "Transfer-Encoding", "chunked"),
        Framing::GzipChunked => {
            push_header(&mut buf, "Content-Encoding", "gzip");
            push_header(&mut buf, "Transfer-Encoding", "chunked");
        }
    }

    // Header/body separator
    buf.extend_from_slice(b"\r\n");

    buf
}

/// Sends one [`Response`]: head first, then the body framed per
/// [`decide_framing`]. HEAD requests get the full head and no body.
pub struct ResponseWriter {
    response: Option<Response>,
    state: WriterState,
}

impl ResponseWriter {
    pub fn new(response: Response) -> Self {
        Self {
            response: Some(response),
            state: WriterState::HeadersPending,
        }
    }

    pub fn state(&self) -> WriterState {
        self.state
    }

    pub async fn write_to_stream<W>(&mut self, stream: &mut W) -> std::io::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let Some(mut resp) = self.response.take() else {
            return Err(std::io::Error::other("response already sent"));
        };

        let framing = decide_framing(&resp);
        if resp.gzip && framing != Framing::GzipChunked {
            resp.gzip = false;
        }
        self.state = WriterState::FramingDecided(framing);
        tracing::debug!(
            status = resp.status.as_u16(),
            ?framing,
            keep_alive = resp.keep_alive,
            "sending response"
        );

        let head = serialize_head(&resp, framing);
        let result = async {
            stream.write_all(&head).await?;

            if resp.request_method != Some(Method::HEAD) {
                self.state = WriterState::BodyTransfer(framing);
                send_body(&mut resp, framing, stream).await?;
            }
            stream.flush().await
        }
        .await;

        // Dropping the response here closes its body source exactly once,
        // whether the transfer finished or failed.
        drop(resp);
        self.state = WriterState::Closed;
        result
    }
}

async fn send_body<W>(resp: &mut Response, framing: Framing, stream: &mut W) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; BODY_BUFFER_SIZE];

    match framing {
        Framing::FixedLength(mut pending) => {
            while pending > 0 {
                let want = pending.min(BODY_BUFFER_SIZE as u64) as usize;
                let n = resp.body.read(&mut buf[..want]).await?;
                if n == 0 {
                    break;
                }
                stream.write_all(&buf[..n]).await?;
                pending -= n as u64;
            }
        }
        Framing::Chunked => {
            let mut chunked = ChunkedWriter::new(stream);
            loop {
                let n = resp.body.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                chunked.write_chunk(&buf[..n]).await?;
            }
            chunked.finish().await?;
        }
        Framing::GzipChunked => {
            let mut chunked = ChunkedWriter::new(stream);
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            loop {
                let n = resp.body.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                encoder.write_all(&buf[..n])?;
                let compressed = std::mem::take(encoder.get_mut());
                chunked.write_chunk(&compressed).await?;
            }
            let tail = encoder.finish()?;
            chunked.write_chunk(&tail).await?;
            chunked.finish().await?;
        }
    }

    Ok(())
}
