use std::fmt;
use std::io::Cursor;

use tokio::io::AsyncRead;

use crate::http::content_type::{Charset, ContentType};
use crate::http::headers::Headers;
use crate::http::request::Method;

pub const MIME_PLAINTEXT: &str = "text/plain";
pub const MIME_HTML: &str = "text/html";

/// HTTP status codes supported by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    /// 101 Switching Protocols
    SwitchingProtocols,
    /// 200 OK
    Ok,
    /// 201 Created
    Created,
    /// 202 Accepted
    Accepted,
    /// 204 No Content
    NoContent,
    /// 206 Partial Content
    PartialContent,
    /// 207 Multi-Status
    MultiStatus,
    /// 301 Moved Permanently
    MovedPermanently,
    /// 303 See Other
    SeeOther,
    /// 304 Not Modified
    NotModified,
    /// 400 Bad Request
    BadRequest,
    /// 401 Unauthorized
    Unauthorized,
    /// 403 Forbidden
    Forbidden,
    /// 404 Not Found
    NotFound,
    /// 405 Method Not Allowed
    MethodNotAllowed,
    /// 406 Not Acceptable
    NotAcceptable,
    /// 408 Request Timeout
    RequestTimeout,
    /// 409 Conflict
    Conflict,
    /// 416 Range Not Satisfiable
    RangeNotSatisfiable,
    /// 500 Internal Server Error
    InternalServerError,
    /// 501 Not Implemented
    NotImplemented,
    /// 505 HTTP Version Not Supported
    HttpVersionNotSupported,
}

impl StatusCode {
    /// Returns the numeric HTTP status code.
    ///
    /// # Example
    ///
    /// ```
    /// # use lantern::http::response::StatusCode;
    /// assert_eq!(StatusCode::Ok.as_u16(), 200);
    /// assert_eq!(StatusCode::MultiStatus.as_u16(), 207);
    /// ```
    pub fn as_u16(&self) -> u16 {
        match self {
            StatusCode::SwitchingProtocols => 101,
            StatusCode::Ok => 200,
            StatusCode::Created => 201,
            StatusCode::Accepted => 202,
            StatusCode::NoContent => 204,
            StatusCode::PartialContent => 206,
            StatusCode::MultiStatus => 207,
            StatusCode::MovedPermanently => 301,
            StatusCode::SeeOther => 303,
            StatusCode::NotModified => 304,
            StatusCode::BadRequest => 400,
            StatusCode::Unauthorized => 401,
            StatusCode::Forbidden => 403,
            StatusCode::NotFound => 404,
            StatusCode::MethodNotAllowed => 405,
            StatusCode::NotAcceptable => 406,
            StatusCode::RequestTimeout => 408,
            StatusCode::Conflict => 409,
            StatusCode::RangeNotSatisfiable => 416,
            StatusCode::InternalServerError => 500,
            StatusCode::NotImplemented => 501,
            StatusCode::HttpVersionNotSupported => 505,
        }
    }

    /// Returns the reason phrase written on the status line.
    pub fn reason_phrase(&self) -> &'static str {
        match self {
            StatusCode::SwitchingProtocols => "Switching Protocols",
            StatusCode::Ok => "OK",
            StatusCode::Created => "Created",
            StatusCode::Accepted => "Accepted",
            StatusCode::NoContent => "No Content",
            StatusCode::PartialContent => "Partial Content",
            StatusCode::MultiStatus => "Multi-Status",
            StatusCode::MovedPermanently => "Moved Permanently",
            StatusCode::SeeOther => "See Other",
            StatusCode::NotModified => "Not Modified",
            StatusCode::BadRequest => "Bad Request",
            StatusCode::Unauthorized => "Unauthorized",
            StatusCode::Forbidden => "Forbidden",
            StatusCode::NotFound => "Not Found",
            StatusCode::MethodNotAllowed => "Method Not Allowed",
            StatusCode::NotAcceptable => "Not Acceptable",
            StatusCode::RequestTimeout => "Request Timeout",
            StatusCode::Conflict => "Conflict",
            StatusCode::RangeNotSatisfiable => "Requested Range Not Satisfiable",
            StatusCode::InternalServerError => "Internal Server Error",
            StatusCode::NotImplemented => "Not Implemented",
            StatusCode::HttpVersionNotSupported => "HTTP Version Not Supported",
        }
    }

    pub fn from_u16(code: u16) -> Option<Self> {
        let status = match code {
            101 => StatusCode::SwitchingProtocols,
            200 => StatusCode::Ok,
            201 => StatusCode::Created,
            202 => StatusCode::Accepted,
            204 => StatusCode::NoContent,
            206 => StatusCode::PartialContent,
            207 => StatusCode::MultiStatus,
            301 => StatusCode::MovedPermanently,
            303 => StatusCode::SeeOther,
            304 => StatusCode::NotModified,
            400 => StatusCode::BadRequest,
            401 => StatusCode::Unauthorized,
            403 => StatusCode::Forbidden,
            404 => StatusCode::NotFound,
            405 => StatusCode::MethodNotAllowed,
            406 => StatusCode::NotAcceptable,
            408 => StatusCode::RequestTimeout,
            409 => StatusCode::Conflict,
            416 => StatusCode::RangeNotSatisfiable,
            500 => StatusCode::InternalServerError,
            501 => StatusCode::NotImplemented,
            505 => StatusCode::HttpVersionNotSupported,
            _ => return None,
        };
        Some(status)
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.as_u16(), self.reason_phrase())
    }
}

/// Byte source for a response body. Dropped (closed) once, after sending.
pub type BodySource = Box<dyn AsyncRead + Send + Unpin>;

/// An HTTP response produced by the handler, sent exactly once.
///
/// The body is a stream with either a known length or no length at all; the
/// [`ResponseWriter`](crate::http::writer::ResponseWriter) picks the wire
/// framing from that, the headers and the negotiated encoding.
pub struct Response {
    pub(crate) status: StatusCode,
    pub(crate) mime_type: Option<String>,
    pub(crate) headers: Headers,
    pub(crate) body: BodySource,
    /// `None` means "stream until exhausted".
    pub(crate) content_length: Option<u64>,
    pub(crate) chunked: bool,
    pub(crate) gzip: bool,
    pub(crate) keep_alive: bool,
    pub(crate) request_method: Option<Method>,
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("mime_type", &self.mime_type)
            .field("headers", &self.headers)
            .field("content_length", &self.content_length)
            .field("chunked", &self.chunked)
            .field("gzip", &self.gzip)
            .field("keep_alive", &self.keep_alive)
            .finish_non_exhaustive()
    }
}

impl Response {
    fn with_source(
        status: StatusCode,
        mime_type: Option<&str>,
        body: BodySource,
        content_length: Option<u64>,
    ) -> Self {
        Self {
            status,
            mime_type: mime_type.map(str::to_string),
            headers: Headers::new(),
            body,
            chunked: content_length.is_none(),
            content_length,
            gzip: false,
            keep_alive: true,
            request_method: None,
        }
    }

    /// Response whose body is exactly `len` bytes read from `data`.
    pub fn fixed_length<R>(status: StatusCode, mime_type: Option<&str>, data: R, len: u64) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        Self::with_source(status, mime_type, Box::new(data), Some(len))
    }

    /// Response streamed with chunked transfer until `data` is exhausted.
    pub fn chunked<R>(status: StatusCode, mime_type: Option<&str>, data: R) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        Self::with_source(status, mime_type, Box::new(data), None)
    }

    /// Fixed-length response over an in-memory body.
    pub fn bytes(status: StatusCode, mime_type: Option<&str>, body: impl Into<Vec<u8>>) -> Self {
        let body = body.into();
        let len = body.len() as u64;
        Self::fixed_length(status, mime_type, Cursor::new(body), len)
    }

    /// Text response encoded in the mime type's charset.
    ///
    /// When no charset is declared and the text is not plain ASCII, the mime
    /// type gains `; charset=UTF-8` and the text is sent as UTF-8. A declared
    /// charset we cannot encode is rewritten to UTF-8.
    pub fn text(status: StatusCode, mime_type: &str, text: &str) -> Self {
        let mut content_type = ContentType::parse(Some(mime_type));
        match content_type.charset() {
            Some(charset) if charset.can_encode(text) => {}
            Some(_) => content_type = content_type.try_utf8(),
            None => {
                tracing::warn!(
                    encoding = content_type.encoding(),
                    "unsupported charset for text response, sending UTF-8"
                );
                content_type = content_type.force_utf8();
            }
        }

        let body = content_type.charset().unwrap_or(Charset::Utf8).encode(text);
        let mime = content_type.header().unwrap_or(mime_type).to_string();
        Self::bytes(status, Some(&mime), body)
    }

    /// 200 OK with an HTML body.
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self::bytes(StatusCode::Ok, Some(MIME_HTML), body)
    }

    /// Creates a 404 Not Found response.
    pub fn not_found() -> Self {
        Self::text(StatusCode::NotFound, MIME_PLAINTEXT, "Not Found")
    }

    /// Creates a 500 Internal Server Error response.
    pub fn internal_error() -> Self {
        Self::text(
            StatusCode::InternalServerError,
            MIME_PLAINTEXT,
            "500 Internal Server Error",
        )
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    pub fn mime_type(&self) -> Option<&str> {
        self.mime_type.as_deref()
    }

    pub fn set_mime_type(&mut self, mime_type: impl Into<String>) {
        self.mime_type = Some(mime_type.into());
    }

    /// Sets a header, replacing an earlier value with the same name.
    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(name, value);
    }

    /// Adds a header line even if the name is already present.
    pub fn append_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.append(name, value);
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Declared body length; `None` when the body is streamed.
    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    pub fn is_chunked(&self) -> bool {
        self.chunked
    }

    pub fn set_chunked_transfer(&mut self, chunked: bool) {
        self.chunked = chunked;
    }

    pub fn is_gzip(&self) -> bool {
        self.gzip
    }

    pub fn set_gzip_encoding(&mut self, gzip: bool) {
        self.gzip = gzip;
    }

    pub fn keep_alive(&self) -> bool {
        self.keep_alive
    }

    pub fn set_keep_alive(&mut self, keep_alive: bool) {
        self.keep_alive = keep_alive;
    }

    pub fn request_method(&self) -> Option<Method> {
        self.request_method
    }

    pub fn set_request_method(&mut self, method: Method) {
        self.request_method = Some(method);
    }

    /// Asks for the connection to be closed after this response.
    pub fn close_connection(&mut self, close: bool) {
        if close {
            self.headers.insert("connection", "close");
        } else {
            self.headers.remove("connection");
        }
    }

    pub fn is_close_connection(&self) -> bool {
        self.header("connection")
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("close"))
    }
}

/// Builder for in-memory responses.
///
/// # Example
///
/// ```ignore
/// let response = ResponseBuilder::new(StatusCode::Ok)
///     .mime_type("application/json")
///     .header("Cache-Control", "no-cache")
///     .body(b"{}".to_vec())
///     .build();
/// ```
pub struct ResponseBuilder {
    status: StatusCode,
    mime_type: Option<String>,
    headers: Headers,
    body: Vec<u8>,
    chunked: bool,
}

impl ResponseBuilder {
    /// Creates a new response builder with the specified status code.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            mime_type: None,
            headers: Headers::new(),
            body: Vec::new(),
            chunked: false,
        }
    }

    pub fn mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    /// Adds or replaces a header.
    ///
    /// Setting `Content-Length` here pins fixed-length framing and disables
    /// gzip for this response.
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key, value);
        self
    }

    /// Sets the response body.
    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    /// Streams the body with chunked transfer instead of a length.
    pub fn chunked(mut self) -> Self {
        self.chunked = true;
        self
    }

    pub fn build(self) -> Response {
        let len = self.body.len() as u64;
        let source = Box::new(Cursor::new(self.body));
        let mut response = if self.chunked {
            Response::with_source(self.status, self.mime_type.as_deref(), source, None)
        } else {
            Response::with_source(self.status, self.mime_type.as_deref(), source, Some(len))
        };
        response.headers = self.headers;
        response
    }
}
