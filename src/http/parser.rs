use std::collections::HashMap;

use percent_encoding::percent_decode_str;

use crate::http::cookie::CookieJar;
use crate::http::cursor::ByteCursor;
use crate::http::headers::Headers;
use crate::http::request::{Method, Request};

/// Capacity of the request-head buffer. A head that does not fit is rejected.
pub const HEADER_BUFFER_SIZE: usize = 8192;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Empty or unreadable request line.
    InvalidRequest,
    /// Request line has a method but no URI.
    MissingUri,
    /// Request line names a verb we do not know.
    InvalidMethod(String),
    /// No blank line within [`HEADER_BUFFER_SIZE`] bytes.
    HeaderTooLarge,
    /// No blank line yet; read more.
    Incomplete,
}

/// Parses a request head (request line plus header lines).
///
/// Returns the request and the offset at which the body starts. Bytes after
/// that offset belong to the body and are left for the caller.
pub fn parse_http_request(buf: &[u8]) -> Result<(Request, usize), ParseError> {
    let body_start = match find_headers_end(buf) {
        Some(end) => end,
        None if buf.len() >= HEADER_BUFFER_SIZE => return Err(ParseError::HeaderTooLarge),
        None => return Err(ParseError::Incomplete),
    };

    let head = String::from_utf8_lossy(&buf[..body_start]);
    let mut lines = head.lines();

    // Request line
    let request_line = lines.next().ok_or(ParseError::InvalidRequest)?;
    let mut parts = request_line.split_whitespace();

    let method_str = parts.next().ok_or(ParseError::InvalidRequest)?;
    let raw_uri = parts.next().ok_or(ParseError::MissingUri)?;

    let mut params = HashMap::new();
    let (uri, query_string) = match raw_uri.split_once('?') {
        Some((path, query)) => {
            decode_query_into(query, &mut params);
            (decode_percent(path), Some(query.to_string()))
        }
        None => (decode_percent(raw_uri), None),
    };

    let version = match parts.next() {
        Some(v) => v.to_string(),
        None => {
            tracing::debug!(uri = %uri, "no protocol version specified, assuming HTTP/1.1");
            "HTTP/1.1".to_string()
        }
    };

    // Headers
    let mut headers = Headers::new();
    for line in lines {
        if line.trim().is_empty() {
            break;
        }

        match line.split_once(':') {
            Some((key, value)) => {
                headers.insert(key.trim().to_ascii_lowercase(), value.trim());
            }
            None => tracing::trace!(line, "ignoring header line without a colon"),
        }
    }

    let method =
        Method::from_str(method_str).ok_or_else(|| ParseError::InvalidMethod(method_str.to_string()))?;

    let cookies = CookieJar::from_headers(&headers);
    let request = Request {
        method,
        uri,
        version,
        query_string,
        headers,
        params,
        files: HashMap::new(),
        cookies,
        remote_addr: None,
    };

    Ok((request, body_start))
}

/// Offset just past the blank line ending the head.
///
/// `\r\n\r\n` is the standard terminator; a bare `\n\n` is tolerated. The
/// earliest of the two wins.
pub fn find_headers_end(buf: &[u8]) -> Option<usize> {
    let cursor = ByteCursor::new(buf);
    let crlf = cursor.find(b"\r\n\r\n").map(|at| (at, at + 4));
    let lf = cursor.find(b"\n\n").map(|at| (at, at + 2));

    match (crlf, lf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a.1 } else { b.1 }),
        (Some(a), None) => Some(a.1),
        (None, Some(b)) => Some(b.1),
        (None, None) => None,
    }
}

/// Percent-decodes one URI component, treating `+` as a space.
///
/// A sequence that does not decode to valid UTF-8 is logged and yields an
/// empty string.
pub fn decode_percent(s: &str) -> String {
    let plus_as_space = s.replace('+', " ");
    match percent_decode_str(&plus_as_space).decode_utf8() {
        Ok(decoded) => decoded.into_owned(),
        Err(e) => {
            tracing::warn!(input = s, error = %e, "percent-decoding failed, ignoring value");
            String::new()
        }
    }
}

/// Decodes `a=1&b=2` style text into a single-valued map (last value wins).
pub fn decode_query(query: &str) -> HashMap<String, String> {
    let mut out = HashMap::new();
    decode_query_into(query, &mut out);
    out
}

/// Like [`decode_query`] but merges into an existing map.
pub fn decode_query_into(query: &str, out: &mut HashMap<String, String>) {
    for token in query.split('&').filter(|t| !t.is_empty()) {
        match token.split_once('=') {
            Some((key, value)) => {
                out.insert(decode_percent(key).trim().to_string(), decode_percent(value));
            }
            None => {
                out.insert(decode_percent(token).trim().to_string(), String::new());
            }
        }
    }
}

/// Decodes a query string keeping every value of a repeated key, in order.
///
/// A key without `=` is recorded with no values.
pub fn decode_query_multi(query: &str) -> HashMap<String, Vec<String>> {
    let mut out: HashMap<String, Vec<String>> = HashMap::new();
    for token in query.split('&').filter(|t| !t.is_empty()) {
        let (key, value) = match token.split_once('=') {
            Some((k, v)) => (k, Some(v)),
            None => (token, None),
        };
        let values = out.entry(decode_percent(key).trim().to_string()).or_default();
        if let Some(v) = value {
            values.push(decode_percent(v));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple_get() {
        let req = b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n";

        let (parsed, consumed) = parse_http_request(req).unwrap();

        assert_eq!(parsed.uri, "/");
        assert_eq!(parsed.headers.get("host").unwrap(), "example.com");
        assert_eq!(consumed, req.len());
    }

    #[test]
    fn tolerant_terminator() {
        assert_eq!(find_headers_end(b"GET / HTTP/1.1\nHost: a\n\nbody"), Some(24));
        assert_eq!(find_headers_end(b"GET / HTTP/1.1\r\n\r\nbody"), Some(18));
        assert_eq!(find_headers_end(b"GET / HTTP/1.1\r\n"), None);
    }

    #[test]
    fn percent_decoding() {
        assert_eq!(decode_percent("Jack%20Daniels"), "Jack Daniels");
        assert_eq!(decode_percent("a+b"), "a b");
        assert_eq!(decode_percent("%FF%FE"), "");
    }
}
