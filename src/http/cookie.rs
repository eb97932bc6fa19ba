//! Minimal cookie support: read what the client sent, queue `Set-Cookie`
//! lines for the response. No `path`, `secure` or `httpOnly` attributes.

use std::collections::HashMap;

use chrono::{Duration, Utc};

use crate::http::headers::Headers;
use crate::http::response::Response;

/// Formats "now + `days`" as an HTTP date in GMT.
pub fn http_time(days: i64) -> String {
    (Utc::now() + Duration::days(days))
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}

/// A cookie queued for the response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub expires: String,
}

impl Cookie {
    /// Cookie expiring in 30 days.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::with_days(name, value, 30)
    }

    pub fn with_days(name: impl Into<String>, value: impl Into<String>, days: i64) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            expires: http_time(days),
        }
    }

    /// Value of the `Set-Cookie` header for this cookie.
    pub fn header_value(&self) -> String {
        format!("{}={}; expires={}", self.name, self.value, self.expires)
    }
}

#[derive(Debug, Clone, Default)]
pub struct CookieJar {
    cookies: HashMap<String, String>,
    queue: Vec<Cookie>,
}

impl CookieJar {
    /// Reads the `cookie` request header. Tokens are `;`-separated
    /// `name=value` pairs; anything else is skipped.
    pub fn from_headers(headers: &Headers) -> Self {
        let mut cookies = HashMap::new();
        if let Some(raw) = headers.get("cookie") {
            for token in raw.split(';') {
                let data: Vec<&str> = token.trim().split('=').collect();
                if let [name, value] = data.as_slice() {
                    cookies.insert(name.to_string(), value.to_string());
                }
            }
        }
        Self {
            cookies,
            queue: Vec::new(),
        }
    }

    pub fn read(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    /// Names of the cookies sent by the client.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.cookies.keys().map(String::as_str)
    }

    pub fn set(&mut self, cookie: Cookie) {
        self.queue.push(cookie);
    }

    pub fn set_with_expiry(&mut self, name: &str, value: &str, days: i64) {
        self.queue.push(Cookie::with_days(name, value, days));
    }

    /// Expires the cookie on the client by re-setting it a month in the past.
    pub fn delete(&mut self, name: &str) {
        self.set_with_expiry(name, "-delete-", -30);
    }

    pub fn queued(&self) -> &[Cookie] {
        &self.queue
    }

    /// Adds every queued cookie to the response as a `Set-Cookie` line.
    pub fn unload_queue(&self, response: &mut Response) {
        for cookie in &self.queue {
            response.append_header("Set-Cookie", cookie.header_value());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_request_cookies() {
        let mut headers = Headers::new();
        headers.insert("cookie", "a=1; b=2; broken; c=3=4");
        let jar = CookieJar::from_headers(&headers);

        assert_eq!(jar.read("a"), Some("1"));
        assert_eq!(jar.read("b"), Some("2"));
        assert_eq!(jar.read("broken"), None);
        assert_eq!(jar.read("c"), None);
        assert_eq!(jar.names().count(), 2);
    }

    #[test]
    fn delete_queues_expired_cookie() {
        let mut jar = CookieJar::default();
        jar.delete("session");
        let queued = &jar.queued()[0];
        assert_eq!(queued.value, "-delete-");
        assert!(queued.header_value().starts_with("session=-delete-; expires="));
        assert!(queued.expires.ends_with("GMT"));
    }
}
