use std::collections::HashMap;

use lantern::error::HttpError;
use lantern::http::body::{BodyBuffer, POST_DATA_KEY, PUT_CONTENT_KEY, decode_body};
use lantern::http::content_type::ContentType;
use lantern::http::multipart::{MAX_PART_HEADER_SIZE, decode_multipart, find_boundaries};
use lantern::http::request::{Method, Request, RequestBuilder};
use lantern::server::tempfile::{DefaultTempFileManager, TempFileManager};

/// Builds a `multipart/form-data` body. `parts` are
/// `(disposition attributes, optional content type, payload)`.
fn multipart_body(boundary: &str, parts: &[(&str, Option<&str>, &[u8])]) -> Vec<u8> {
    let mut body = Vec::new();
    for (disposition, content_type, payload) in parts {
        body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
        body.extend_from_slice(format!("Content-Disposition: form-data; {disposition}\r\n").as_bytes());
        if let Some(ct) = content_type {
            body.extend_from_slice(format!("Content-Type: {ct}\r\n").as_bytes());
        }
        body.extend_from_slice(b"\r\n");
        body.extend_from_slice(payload);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
    body
}

fn decode(
    boundary: &str,
    body: Vec<u8>,
    temp: &mut DefaultTempFileManager,
) -> Result<(HashMap<String, String>, HashMap<String, String>), HttpError> {
    let content_type = ContentType::parse(Some(&format!("multipart/form-data; boundary={boundary}")));
    let mut params = HashMap::new();
    let mut files = HashMap::new();
    let mut buffer = BodyBuffer::Memory(body);
    decode_multipart(&content_type, &mut buffer, &mut params, &mut files, temp)?;
    Ok((params, files))
}

fn post(content_type: &str) -> Request {
    RequestBuilder::new()
        .method(Method::POST)
        .uri("/upload")
        .header("Content-Type", content_type)
        .build()
        .unwrap()
}

#[test]
fn test_single_text_part() {
    let dir = tempfile::tempdir().unwrap();
    let mut temp = DefaultTempFileManager::in_dir(dir.path());
    let body = multipart_body("X", &[("name=\"caption\"", None, b"Summer vacation")]);

    let (params, files) = decode("X", body, &mut temp).unwrap();

    assert_eq!(params.len(), 1);
    assert_eq!(params["caption"], "Summer vacation");
    assert!(files.is_empty());
    assert!(temp.is_empty());
}

#[test]
fn test_text_and_file_parts() {
    let dir = tempfile::tempdir().unwrap();
    let mut temp = DefaultTempFileManager::in_dir(dir.path());
    let payload: Vec<u8> = (0..=255u8).cycle().take(3000).collect();
    let boundary = "----WebKitFormBoundary7MA4YWxkTrZu0gW";
    let body = multipart_body(
        boundary,
        &[
            ("name=\"title\"", None, b"holiday"),
            ("name=\"photo\"; filename=\"beach.png\"", Some("image/png"), &payload),
        ],
    );

    let (params, files) = decode(boundary, body, &mut temp).unwrap();

    assert_eq!(params["title"], "holiday");
    assert_eq!(params["photo"], "beach.png");
    let saved = std::fs::read(&files["photo"]).unwrap();
    assert_eq!(saved, payload);
    assert_eq!(temp.len(), 1);

    temp.clear();
    assert!(!std::path::Path::new(&files["photo"]).exists());
}

#[test]
fn test_two_files_under_one_field() {
    let dir = tempfile::tempdir().unwrap();
    let mut temp = DefaultTempFileManager::in_dir(dir.path());
    let body = multipart_body(
        "B0undary",
        &[
            ("name=\"docs\"; filename=\"a.txt\"", Some("text/plain"), b"first"),
            ("name=\"docs\"; filename=\"b.txt\"", Some("text/plain"), b"second"),
        ],
    );

    let (params, files) = decode("B0undary", body, &mut temp).unwrap();

    assert_eq!(params["docs"], "a.txt");
    assert_eq!(params["docs1"], "b.txt");
    assert_eq!(std::fs::read(&files["docs"]).unwrap(), b"first");
    assert_eq!(std::fs::read(&files["docs1"]).unwrap(), b"second");
}

#[test]
fn test_typed_parts_without_filename_get_numbered_keys() {
    let dir = tempfile::tempdir().unwrap();
    let mut temp = DefaultTempFileManager::in_dir(dir.path());
    let body = multipart_body(
        "Qz9",
        &[
            ("name=\"blob\"", Some("application/octet-stream"), b"one"),
            ("name=\"blob\"", Some("application/octet-stream"), b"two"),
            ("name=\"blob\"", Some("application/octet-stream"), b"three"),
        ],
    );

    let (_, files) = decode("Qz9", body, &mut temp).unwrap();

    assert_eq!(std::fs::read(&files["blob"]).unwrap(), b"one");
    assert_eq!(std::fs::read(&files["blob2"]).unwrap(), b"two");
    assert_eq!(std::fs::read(&files["blob3"]).unwrap(), b"three");
}

#[test]
fn test_part_data_may_contain_crlf() {
    let dir = tempfile::tempdir().unwrap();
    let mut temp = DefaultTempFileManager::in_dir(dir.path());
    let body = multipart_body("zz", &[("name=\"notes\"", None, b"line one\r\nline two\r\n")]);

    let (params, _) = decode("zz", body, &mut temp).unwrap();
    assert_eq!(params["notes"], "line one\r\nline two\r\n");
}

#[test]
fn test_fewer_than_two_boundaries_is_bad_request() {
    let dir = tempfile::tempdir().unwrap();
    let mut temp = DefaultTempFileManager::in_dir(dir.path());
    let body = b"--X\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\nvalue".to_vec();

    let err = decode("X", body, &mut temp).unwrap_err();
    assert!(matches!(err, HttpError::MalformedRequest(_)));
}

#[test]
fn test_oversized_part_header_is_internal_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut temp = DefaultTempFileManager::in_dir(dir.path());
    let long_name = "n".repeat(MAX_PART_HEADER_SIZE);
    let disposition = format!("name=\"{long_name}\"");
    let body = multipart_body("X", &[(disposition.as_str(), None, b"v")]);

    let err = decode("X", body, &mut temp).unwrap_err();
    assert!(matches!(err, HttpError::Internal(_)));
}

#[test]
fn test_boundaries_in_spilled_body() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("body");
    let payload = vec![b'.'; 10_000];
    let data = multipart_body("edge", &[("name=\"f\"", Some("text/plain"), &payload)]);
    std::fs::write(&path, &data).unwrap();

    let mut body = BodyBuffer::Disk {
        file: std::fs::File::open(&path).unwrap(),
        len: data.len() as u64,
    };
    let offsets = find_boundaries(&mut body, b"edge").unwrap();
    assert_eq!(offsets.len(), 2);
    assert_eq!(offsets[0], 2);
    assert_eq!(offsets[1], (data.len() - "edge--\r\n".len()) as u64);
}

#[test]
fn test_post_without_boundary_is_bad_request() {
    let dir = tempfile::tempdir().unwrap();
    let mut temp = DefaultTempFileManager::in_dir(dir.path());
    let mut req = post("multipart/form-data");
    let mut body = BodyBuffer::Memory(b"--X--".to_vec());

    let err = decode_body(&mut req, &mut body, &mut temp).unwrap_err();
    assert!(matches!(err, HttpError::MalformedRequest(_)));
}

#[test]
fn test_post_urlencoded_merges_params() {
    let dir = tempfile::tempdir().unwrap();
    let mut temp = DefaultTempFileManager::in_dir(dir.path());
    let mut req = post("application/x-www-form-urlencoded");
    req.params.insert("from_query".into(), "yes".into());
    let mut body = BodyBuffer::Memory(b"a=1&b=2\r\n".to_vec());

    decode_body(&mut req, &mut body, &mut temp).unwrap();

    assert_eq!(req.params["a"], "1");
    assert_eq!(req.params["b"], "2");
    assert_eq!(req.params["from_query"], "yes");
    assert!(req.files.is_empty());
}

#[test]
fn test_post_raw_body_goes_to_post_data() {
    let dir = tempfile::tempdir().unwrap();
    let mut temp = DefaultTempFileManager::in_dir(dir.path());
    let mut req = post("application/json");
    let mut body = BodyBuffer::Memory(b"  {\"k\": 1}\n".to_vec());

    decode_body(&mut req, &mut body, &mut temp).unwrap();
    assert_eq!(req.files[POST_DATA_KEY], "{\"k\": 1}");

    let mut req = post("application/json");
    let mut empty = BodyBuffer::Memory(Vec::new());
    decode_body(&mut req, &mut empty, &mut temp).unwrap();
    assert!(!req.files.contains_key(POST_DATA_KEY));
}

#[test]
fn test_put_body_saved_to_temp_file() {
    let dir = tempfile::tempdir().unwrap();
    let mut temp = DefaultTempFileManager::in_dir(dir.path());
    let mut req = RequestBuilder::new()
        .method(Method::PUT)
        .uri("/files/x")
        .build()
        .unwrap();
    let mut body = BodyBuffer::Memory(b"raw bytes".to_vec());

    decode_body(&mut req, &mut body, &mut temp).unwrap();
    assert_eq!(std::fs::read(&req.files[PUT_CONTENT_KEY]).unwrap(), b"raw bytes");

    let mut req = RequestBuilder::new()
        .method(Method::PUT)
        .uri("/files/y")
        .build()
        .unwrap();
    let mut empty = BodyBuffer::Memory(Vec::new());
    decode_body(&mut req, &mut empty, &mut temp).unwrap();
    assert_eq!(req.files[PUT_CONTENT_KEY], "");
}
