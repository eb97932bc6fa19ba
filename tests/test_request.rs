use lantern::http::content_type::Charset;
use lantern::http::cookie::Cookie;
use lantern::http::request::{Method, RequestBuilder};
use lantern::http::response::Response;

#[test]
fn test_request_header_retrieval() {
    let req = RequestBuilder::new()
        .method(Method::GET)
        .uri("/")
        .header("Host", "example.com")
        .header("Content-Type", "application/json")
        .build()
        .unwrap();

    assert_eq!(req.header("Host"), Some("example.com"));
    assert_eq!(req.header("content-type"), Some("application/json"));
    assert_eq!(req.header("Missing"), None);
}

#[test]
fn test_request_content_length_parsing() {
    let req = RequestBuilder::new()
        .method(Method::POST)
        .uri("/api")
        .header("Content-Length", " 42 ")
        .build()
        .unwrap();
    assert_eq!(req.content_length(), Some(Ok(42)));

    let req = RequestBuilder::new()
        .method(Method::POST)
        .uri("/api")
        .header("Content-Length", "forty")
        .build()
        .unwrap();
    assert!(matches!(req.content_length(), Some(Err(_))));

    let req = RequestBuilder::new()
        .method(Method::GET)
        .uri("/")
        .build()
        .unwrap();
    assert_eq!(req.content_length(), None);
}

#[test]
fn test_request_content_type_defaults() {
    let req = RequestBuilder::new()
        .method(Method::POST)
        .uri("/form")
        .header("Content-Type", "multipart/form-data; boundary=XyZ; charset=utf-8")
        .build()
        .unwrap();
    let ct = req.content_type();

    assert!(ct.is_multipart());
    assert_eq!(ct.boundary(), Some("XyZ"));
    assert_eq!(ct.charset(), Some(Charset::Utf8));

    let req = RequestBuilder::new()
        .method(Method::POST)
        .uri("/form")
        .header("Content-Type", "application/x-www-form-urlencoded")
        .build()
        .unwrap();
    assert!(req.content_type().is_form_urlencoded());
    assert_eq!(req.content_type().encoding(), "US-ASCII");
}

#[test]
fn test_request_keep_alive_requires_http11() {
    let req = RequestBuilder::new()
        .method(Method::GET)
        .uri("/")
        .version("HTTP/1.0")
        .build()
        .unwrap();
    assert!(!req.keep_alive());

    let req = RequestBuilder::new()
        .method(Method::GET)
        .uri("/")
        .header("Connection", "Close")
        .build()
        .unwrap();
    assert!(!req.keep_alive());

    let req = RequestBuilder::new()
        .method(Method::GET)
        .uri("/")
        .build()
        .unwrap();
    assert!(req.keep_alive());
}

#[test]
fn test_request_accepts_gzip() {
    let req = RequestBuilder::new()
        .method(Method::GET)
        .uri("/")
        .header("Accept-Encoding", "deflate, gzip;q=1.0")
        .build()
        .unwrap();
    assert!(req.accepts_gzip());

    let req = RequestBuilder::new()
        .method(Method::GET)
        .uri("/")
        .build()
        .unwrap();
    assert!(!req.accepts_gzip());

    let req = RequestBuilder::new()
        .method(Method::GET)
        .uri("/")
        .header("Accept-Encoding", "GZIP")
        .build()
        .unwrap();
    assert!(req.accepts_gzip());
}

#[test]
fn test_decode_parameters_keeps_repeats() {
    let req = RequestBuilder::new()
        .method(Method::GET)
        .uri("/search")
        .query_string("tag=a&tag=b%20c&page=2")
        .build()
        .unwrap();
    let params = req.decode_parameters();

    assert_eq!(params["tag"], vec!["a", "b c"]);
    assert_eq!(params["page"], vec!["2"]);
}

#[test]
fn test_builder_requires_method_and_uri() {
    assert!(RequestBuilder::new().uri("/").build().is_err());
    assert!(RequestBuilder::new().method(Method::GET).build().is_err());
}

#[test]
fn test_cookies_from_header_and_queue() {
    let mut req = RequestBuilder::new()
        .method(Method::GET)
        .uri("/")
        .header("Cookie", "session=abc123; theme=dark")
        .build()
        .unwrap();

    assert_eq!(req.cookies.read("session"), Some("abc123"));
    assert_eq!(req.cookies.read("theme"), Some("dark"));

    req.cookies.set(Cookie::new("visited", "yes"));
    req.cookies.delete("theme");
    assert_eq!(req.cookies.queued().len(), 2);

    let mut response = Response::ok("hi");
    req.cookies.unload_queue(&mut response);

    let set_cookies: Vec<&str> = response
        .headers()
        .iter()
        .filter(|(k, _)| k.eq_ignore_ascii_case("set-cookie"))
        .map(|(_, v)| v)
        .collect();
    assert_eq!(set_cookies.len(), 2);
    assert!(set_cookies[0].starts_with("visited=yes; expires="));
    assert!(set_cookies[0].ends_with(" GMT"));
    assert!(set_cookies[1].starts_with("theme=-delete-; expires="));
}
