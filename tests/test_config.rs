use std::collections::HashMap;
use std::io::Write;

use lantern::config::{CONFIG_FILE_ENV, Config, LISTEN_ENV, READ_TIMEOUT_ENV};

fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| vars.get(key).cloned()
}

#[test]
fn test_config_defaults() {
    let cfg = Config::load_with(lookup(&[])).unwrap();

    assert_eq!(cfg, Config::default());
    assert_eq!(cfg.listen_addr(), "0.0.0.0:8080");
    assert_eq!(cfg.read_timeout_ms, 5000);
    assert_eq!(cfg.memory_threshold, 1024);
    assert_eq!(cfg.gzip_mime_types, vec!["text/".to_string()]);
}

#[test]
fn test_config_custom_address_from_env() {
    let cfg = Config::load_with(lookup(&[(LISTEN_ENV, "127.0.0.1:3000")])).unwrap();

    assert_eq!(cfg.hostname.as_deref(), Some("127.0.0.1"));
    assert_eq!(cfg.port, 3000);
    assert_eq!(cfg.listen_addr(), "127.0.0.1:3000");
}

#[test]
fn test_config_bad_overrides_are_errors() {
    assert!(Config::load_with(lookup(&[(LISTEN_ENV, "no-port")])).is_err());
    assert!(Config::load_with(lookup(&[(READ_TIMEOUT_ENV, "soon")])).is_err());
}

#[test]
fn test_config_from_yaml() {
    let cfg = Config::from_yaml_str(
        "hostname: localhost\nport: 9090\ngzip_mime_types:\n  - text/\n  - application/json\n",
    )
    .unwrap();

    assert_eq!(cfg.listen_addr(), "localhost:9090");
    assert_eq!(cfg.read_timeout_ms, 5000);
    assert!((cfg.gzip_policy())("application/json; charset=utf-8"));
    assert!(!(cfg.gzip_policy())("image/png"));
}

#[test]
fn test_config_file_then_env_overrides() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "port: 7000\nread_timeout_ms: 250\nmemory_threshold: 4096").unwrap();
    let path = file.path().to_str().unwrap().to_string();

    let cfg = Config::load_with(lookup(&[
        (CONFIG_FILE_ENV, path.as_str()),
        (READ_TIMEOUT_ENV, "900"),
    ]))
    .unwrap();

    assert_eq!(cfg.port, 7000);
    assert_eq!(cfg.memory_threshold, 4096);
    assert_eq!(cfg.read_timeout_ms, 900);
}

#[test]
fn test_config_load_reads_process_env() {
    unsafe {
        std::env::set_var(LISTEN_ENV, "127.0.0.1:5000");
    }
    let cfg = Config::load().unwrap();
    assert_eq!(cfg.listen_addr(), "127.0.0.1:5000");
    unsafe {
        std::env::remove_var(LISTEN_ENV);
    }
}

#[test]
fn test_config_clone() {
    let cfg1 = Config::default();
    let cfg2 = cfg1.clone();
    assert_eq!(cfg1.listen_addr(), cfg2.listen_addr());
}
