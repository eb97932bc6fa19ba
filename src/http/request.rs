use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;

use crate::http::content_type::ContentType;
use crate::http::cookie::CookieJar;
use crate::http::headers::Headers;
use crate::http::parser::decode_query_multi;

/// HTTP request methods.
///
/// The request line must name one of these verbs exactly (case-sensitive);
/// anything else is rejected with 400 Bad Request. The WebDAV verbs are
/// accepted so applications can implement them, the server itself gives
/// them no special treatment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(clippy::upper_case_acronyms)]
pub enum Method {
    /// GET - Retrieve a resource
    GET,
    /// PUT - Replace a resource; the body is staged to a temp file
    PUT,
    /// POST - Submit data; form and multipart bodies are decoded
    POST,
    /// DELETE - Delete a resource
    DELETE,
    /// HEAD - Like GET but without the response body
    HEAD,
    /// OPTIONS - Describe communication options
    OPTIONS,
    /// TRACE - Message loop-back test
    TRACE,
    /// CONNECT - Tunnel request
    CONNECT,
    /// PATCH - Partial modification of a resource
    PATCH,
    /// WebDAV property retrieval
    PROPFIND,
    /// WebDAV property update
    PROPPATCH,
    /// WebDAV collection creation
    MKCOL,
    /// WebDAV move
    MOVE,
    /// WebDAV copy
    COPY,
    /// WebDAV lock
    LOCK,
    /// WebDAV unlock
    UNLOCK,
}

impl Method {
    /// Parses an HTTP method from a string.
    ///
    /// # Example
    ///
    /// ```
    /// # use lantern::http::request::Method;
    /// assert_eq!(Method::from_str("GET"), Some(Method::GET));
    /// assert_eq!(Method::from_str("PROPFIND"), Some(Method::PROPFIND));
    /// assert_eq!(Method::from_str("get"), None);
    /// ```
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "GET" => Some(Method::GET),
            "PUT" => Some(Method::PUT),
            "POST" => Some(Method::POST),
            "DELETE" => Some(Method::DELETE),
            "HEAD" => Some(Method::HEAD),
            "OPTIONS" => Some(Method::OPTIONS),
            "TRACE" => Some(Method::TRACE),
            "CONNECT" => Some(Method::CONNECT),
            "PATCH" => Some(Method::PATCH),
            "PROPFIND" => Some(Method::PROPFIND),
            "PROPPATCH" => Some(Method::PROPPATCH),
            "MKCOL" => Some(Method::MKCOL),
            "MOVE" => Some(Method::MOVE),
            "COPY" => Some(Method::COPY),
            "LOCK" => Some(Method::LOCK),
            "UNLOCK" => Some(Method::UNLOCK),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::GET => "GET",
            Method::PUT => "PUT",
            Method::POST => "POST",
            Method::DELETE => "DELETE",
            Method::HEAD => "HEAD",
            Method::OPTIONS => "OPTIONS",
            Method::TRACE => "TRACE",
            Method::CONNECT => "CONNECT",
            Method::PATCH => "PATCH",
            Method::PROPFIND => "PROPFIND",
            Method::PROPPATCH => "PROPPATCH",
            Method::MKCOL => "MKCOL",
            Method::MOVE => "MOVE",
            Method::COPY => "COPY",
            Method::LOCK => "LOCK",
            Method::UNLOCK => "UNLOCK",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-request session state handed to the application handler.
///
/// Rebuilt from scratch for every request on a connection. Header names are
/// stored lowercased; a header repeated on the wire keeps only its last value.
#[derive(Debug, Clone)]
pub struct Request {
    /// The HTTP method (GET, POST, etc.)
    pub method: Method,
    /// Percent-decoded request path, without the query string
    pub uri: String,
    /// Protocol version token, `HTTP/1.1` when the client omitted it
    pub version: String,
    /// Raw query string (text after the first `?`), if any
    pub query_string: Option<String>,
    /// Request headers, names lowercased
    pub headers: Headers,
    /// Query, urlencoded-form and multipart text parameters
    pub params: HashMap<String, String>,
    /// Uploaded file paths by field name, plus the `postData`/`content` keys
    pub files: HashMap<String, String>,
    /// Cookies sent by the client and cookies queued for the response
    pub cookies: CookieJar,
    /// Peer IP address, when served from a socket
    pub remote_addr: Option<IpAddr>,
}

/// Builder for constructing Request objects outside the parser (mostly tests
/// and handler unit tests).
pub struct RequestBuilder {
    method: Option<Method>,
    uri: Option<String>,
    version: Option<String>,
    query_string: Option<String>,
    headers: Headers,
    params: HashMap<String, String>,
}

impl RequestBuilder {
    pub fn new() -> Self {
        Self {
            method: None,
            uri: None,
            version: None,
            query_string: None,
            headers: Headers::new(),
            params: HashMap::new(),
        }
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    pub fn uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn query_string(mut self, query: impl Into<String>) -> Self {
        self.query_string = Some(query.into());
        self
    }

    /// Adds a header; the name is lowercased like the wire parser does.
    pub fn header(mut self, key: &str, value: impl Into<String>) -> Self {
        self.headers.insert(key.to_ascii_lowercase(), value);
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> Result<Request, &'static str> {
        let cookies = CookieJar::from_headers(&self.headers);
        Ok(Request {
            method: self.method.ok_or("method missing")?,
            uri: self.uri.ok_or("uri missing")?,
            version: self.version.unwrap_or_else(|| "HTTP/1.1".to_string()),
            query_string: self.query_string,
            headers: self.headers,
            params: self.params,
            files: HashMap::new(),
            cookies,
            remote_addr: None,
        })
    }
}

impl Default for RequestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Request {
    /// Retrieves a header value by name, ignoring case.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key)
    }

    /// Raw `Content-Length` header value parsed as a number.
    ///
    /// `None` when the header is absent; `Some(Err(..))` when it is present
    /// but not a valid length.
    pub fn content_length(&self) -> Option<Result<u64, std::num::ParseIntError>> {
        self.header("content-length").map(|v| v.trim().parse())
    }

    /// Parsed `Content-Type` of the request body.
    pub fn content_type(&self) -> ContentType {
        ContentType::parse(self.header("content-type"))
    }

    /// Determines whether the connection may stay open after the response.
    ///
    /// Only `HTTP/1.1` requests are eligible, and only when the `Connection`
    /// header (if any) does not mention `close` in any casing.
    pub fn keep_alive(&self) -> bool {
        self.version == "HTTP/1.1"
            && self
                .header("connection")
                .map(|v| !v.to_ascii_lowercase().contains("close"))
                .unwrap_or(true)
    }

    /// Whether the client advertised gzip in `Accept-Encoding`.
    pub fn accepts_gzip(&self) -> bool {
        self.header("accept-encoding")
            .map(|v| v.to_ascii_lowercase().contains("gzip"))
            .unwrap_or(false)
    }

    /// Decodes the query string keeping every value of repeated keys.
    pub fn decode_parameters(&self) -> HashMap<String, Vec<String>> {
        self.query_string
            .as_deref()
            .map(decode_query_multi)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keep_alive_rules() {
        let req = RequestBuilder::new()
            .method(Method::GET)
            .uri("/")
            .build()
            .unwrap();
        assert!(req.keep_alive());

        let req = RequestBuilder::new()
            .method(Method::GET)
            .uri("/")
            .header("Connection", "Keep-Alive, CLOSE")
            .build()
            .unwrap();
        assert!(!req.keep_alive());

        let req = RequestBuilder::new()
            .method(Method::GET)
            .uri("/")
            .version("HTTP/1.0")
            .header("Connection", "keep-alive")
            .build()
            .unwrap();
        assert!(!req.keep_alive());
    }

    #[test]
    fn method_round_trips_through_display() {
        for verb in ["GET", "MKCOL", "UNLOCK", "PROPPATCH"] {
            let m = Method::from_str(verb).unwrap();
            assert_eq!(m.to_string(), verb);
        }
    }
}
