use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};

use crate::error::{HttpError, HttpResult};
use crate::http::body::{self, MEMORY_STORE_LIMIT};
use crate::http::handler::Handler;
use crate::http::parser::{HEADER_BUFFER_SIZE, ParseError, parse_http_request};
use crate::http::request::{Method, Request};
use crate::http::response::{MIME_PLAINTEXT, Response, StatusCode};
use crate::http::writer::ResponseWriter;
use crate::server::tempfile::{DefaultTempFileManagerFactory, TempFileManagerFactory, TempFileScope};

/// Decides from a response mime type whether gzip may be used.
pub type GzipPolicy = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Gzip for `text/*` bodies.
pub fn default_gzip_policy() -> GzipPolicy {
    Arc::new(|mime: &str| mime.to_ascii_lowercase().contains("text/"))
}

pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(5000);

/// Everything a connection needs besides its socket. Shared by all
/// connections of one server.
pub struct ConnectionContext {
    pub handler: Arc<dyn Handler>,
    pub temp_files: Arc<dyn TempFileManagerFactory>,
    pub gzip_policy: GzipPolicy,
    pub read_timeout: Duration,
    pub memory_threshold: usize,
}

impl ConnectionContext {
    pub fn new(handler: Arc<dyn Handler>) -> Self {
        Self {
            handler,
            temp_files: Arc::new(DefaultTempFileManagerFactory),
            gzip_policy: default_gzip_policy(),
            read_timeout: DEFAULT_READ_TIMEOUT,
            memory_threshold: MEMORY_STORE_LIMIT,
        }
    }
}

/// One accepted connection, driven through parse → handle → respond cycles
/// until keep-alive ends.
pub struct Connection<S> {
    stream: S,
    buffer: BytesMut,
    peer: Option<IpAddr>,
    ctx: Arc<ConnectionContext>,
    state: ConnectionState,
}

pub enum ConnectionState {
    Reading,
    Processing(Box<Request>),
    /// Response ready to send. The temp-file scope of the request that
    /// produced it lives until the response is on the wire.
    Writing {
        writer: ResponseWriter,
        keep_alive: bool,
        scope: Option<TempFileScope>,
    },
    Closed,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(stream: S, peer: Option<SocketAddr>, ctx: Arc<ConnectionContext>) -> Self {
        Self {
            stream,
            buffer: BytesMut::with_capacity(HEADER_BUFFER_SIZE),
            peer: peer.map(|addr| addr.ip()),
            ctx,
            state: ConnectionState::Reading,
        }
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub async fn run(&mut self) -> anyhow::Result<()> {
        loop {
            match std::mem::replace(&mut self.state, ConnectionState::Closed) {
                ConnectionState::Reading => {
                    self.state = match self.read_request().await {
                        Ok(Some(req)) => ConnectionState::Processing(Box::new(req)),
                        Ok(None) => ConnectionState::Closed,
                        Err(e) => self.fault(e, None),
                    };
                }

                ConnectionState::Processing(req) => {
                    self.state = self.process(*req).await;
                }

                ConnectionState::Writing {
                    mut writer,
                    keep_alive,
                    scope,
                } => {
                    let sent = writer.write_to_stream(&mut self.stream).await;
                    // Request temp files go away whether or not the send worked.
                    drop(scope);
                    sent?;

                    self.state = if keep_alive {
                        ConnectionState::Reading
                    } else {
                        ConnectionState::Closed
                    };
                }

                ConnectionState::Closed => {
                    break;
                }
            }
        }

        Ok(())
    }

    /// Reads until a full request head is buffered and parses it.
    ///
    /// `Ok(None)` means the peer went away (EOF, reset or idle timeout) and
    /// the connection should be dropped silently.
    pub async fn read_request(&mut self) -> HttpResult<Option<Request>> {
        loop {
            match parse_http_request(&self.buffer) {
                Ok((mut request, body_start)) => {
                    // Everything past the head stays buffered as body prefix.
                    self.buffer.advance(body_start);
                    self.annotate_peer(&mut request);
                    tracing::debug!(method = %request.method, uri = %request.uri, "request parsed");
                    return Ok(Some(request));
                }

                Err(ParseError::Incomplete) => {}

                Err(e) => return Err(e.into()),
            }

            let mut temp = [0u8; HEADER_BUFFER_SIZE];
            let room = HEADER_BUFFER_SIZE - self.buffer.len().min(HEADER_BUFFER_SIZE);
            let read = tokio::time::timeout(self.ctx.read_timeout, self.stream.read(&mut temp[..room]));

            match read.await {
                Ok(Ok(0)) => {
                    tracing::trace!("peer closed connection");
                    return Ok(None);
                }
                Ok(Ok(n)) => self.buffer.extend_from_slice(&temp[..n]),
                Ok(Err(e)) => {
                    tracing::debug!(error = %e, "read failed, closing connection");
                    return Ok(None);
                }
                Err(_) => {
                    tracing::debug!("read timed out, closing connection");
                    return Ok(None);
                }
            }
        }
    }

    fn annotate_peer(&self, request: &mut Request) {
        let Some(ip) = self.peer else {
            return;
        };
        let shown = if ip.is_loopback() || ip.is_unspecified() {
            IpAddr::V4(Ipv4Addr::LOCALHOST).to_string()
        } else {
            ip.to_string()
        };
        request.headers.insert("remote-addr", shown.clone());
        request.headers.insert("http-client-ip", shown);
        request.remote_addr = Some(ip);
    }

    async fn process(&mut self, mut request: Request) -> ConnectionState {
        let mut scope = TempFileScope::new(self.ctx.temp_files.create());

        if let Err(e) = self.read_and_decode_body(&mut request, &mut scope).await {
            return self.fault(e, Some(scope));
        }

        let mut response = match self.ctx.handler.serve(&mut request) {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(error = %e, uri = %request.uri, "handler failed");
                return self.fault(HttpError::internal(e.to_string()), Some(scope));
            }
        };

        request.cookies.unload_queue(&mut response);
        response.set_request_method(request.method);

        let gzip = request.accepts_gzip()
            && response.mime_type().is_some_and(|mime| (self.ctx.gzip_policy)(mime));
        response.set_gzip_encoding(gzip);

        let keep_alive = request.keep_alive() && !response.is_close_connection();
        response.set_keep_alive(keep_alive);

        tracing::debug!(
            method = %request.method,
            uri = %request.uri,
            status = response.status().as_u16(),
            "request served"
        );

        ConnectionState::Writing {
            writer: ResponseWriter::new(response),
            keep_alive,
            scope: Some(scope),
        }
    }

    async fn read_and_decode_body(&mut self, request: &mut Request, scope: &mut TempFileScope) -> HttpResult<()> {
        let size = body::body_size(request, self.buffer.len())?;

        match request.method {
            Method::POST | Method::PUT => {
                let mut staged = body::read_body(
                    &mut self.buffer,
                    &mut self.stream,
                    size,
                    self.ctx.memory_threshold,
                    self.ctx.read_timeout,
                    &mut **scope,
                )
                .await?;
                body::decode_body(request, &mut staged, &mut **scope)
            }
            _ => body::discard_body(&mut self.buffer, &mut self.stream, size, self.ctx.read_timeout).await,
        }
    }

    /// Turns a fault into a plain-text response that closes the connection,
    /// or straight into `Closed` for I/O faults.
    fn fault(&self, err: HttpError, scope: Option<TempFileScope>) -> ConnectionState {
        let Some(status) = err.status() else {
            tracing::debug!(error = %err, "connection I/O fault");
            return ConnectionState::Closed;
        };

        match status {
            StatusCode::BadRequest => tracing::warn!(error = %err, "malformed request"),
            _ => tracing::error!(error = %err, "request failed"),
        }

        let mut response = Response::text(status, MIME_PLAINTEXT, &err.to_string());
        response.set_keep_alive(false);
        ConnectionState::Writing {
            writer: ResponseWriter::new(response),
            keep_alive: false,
            scope,
        }
    }
}
