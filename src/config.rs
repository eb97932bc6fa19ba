use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

use crate::http::connection::GzipPolicy;

/// Env var naming an optional YAML config file.
pub const CONFIG_FILE_ENV: &str = "LANTERN_CONFIG";
/// Env var overriding the bind address, as `host:port`.
pub const LISTEN_ENV: &str = "LISTEN";
/// Env var overriding the socket read timeout in milliseconds.
pub const READ_TIMEOUT_ENV: &str = "LANTERN_READ_TIMEOUT_MS";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Interface to bind; all interfaces when unset.
    pub hostname: Option<String>,
    pub port: u16,
    pub read_timeout_ms: u64,
    /// Request bodies of this many bytes or more are staged on disk.
    pub memory_threshold: usize,
    /// Substrings of compressible mime types, matched case-insensitively.
    pub gzip_mime_types: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            hostname: None,
            port: 8080,
            read_timeout_ms: 5000,
            memory_threshold: 1024,
            gzip_mime_types: vec!["text/".to_string()],
        }
    }
}

impl Config {
    /// Defaults, then the YAML file named by `LANTERN_CONFIG`, then the
    /// `LISTEN` and `LANTERN_READ_TIMEOUT_MS` overrides.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    /// Same as [`Config::load`] with a custom variable lookup.
    pub fn load_with(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let mut cfg = match lookup(CONFIG_FILE_ENV) {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };

        if let Some(listen) = lookup(LISTEN_ENV) {
            let (host, port) = parse_listen(&listen)?;
            cfg.hostname = host;
            cfg.port = port;
        }

        if let Some(timeout) = lookup(READ_TIMEOUT_ENV) {
            cfg.read_timeout_ms = timeout
                .trim()
                .parse()
                .with_context(|| format!("{READ_TIMEOUT_ENV} is not a number: {timeout:?}"))?;
        }

        Ok(cfg)
    }

    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::from_yaml_str(&text).with_context(|| format!("parsing config file {}", path.display()))
    }

    pub fn from_yaml_str(text: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// `host:port` to bind, `0.0.0.0` standing in for a missing hostname.
    pub fn listen_addr(&self) -> String {
        match self.hostname.as_deref() {
            Some(host) if host.contains(':') => format!("[{}]:{}", host, self.port),
            Some(host) => format!("{}:{}", host, self.port),
            None => format!("0.0.0.0:{}", self.port),
        }
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Predicate telling whether a response mime type may be gzip-encoded.
    pub fn gzip_policy(&self) -> GzipPolicy {
        let patterns: Vec<String> = self
            .gzip_mime_types
            .iter()
            .map(|p| p.to_ascii_lowercase())
            .collect();
        Arc::new(move |mime: &str| {
            let mime = mime.to_ascii_lowercase();
            patterns.iter().any(|p| mime.contains(p.as_str()))
        })
    }
}

/// Splits `host:port`. An empty host means all interfaces.
pub fn parse_listen(value: &str) -> anyhow::Result<(Option<String>, u16)> {
    let (host, port) = value
        .trim()
        .rsplit_once(':')
        .with_context(|| format!("{LISTEN_ENV} must look like host:port, got {value:?}"))?;
    let port = port
        .parse()
        .with_context(|| format!("invalid port in {LISTEN_ENV}: {port:?}"))?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    let host = (!host.is_empty()).then(|| host.to_string());
    Ok((host, port))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listen_parsing() {
        assert_eq!(
            parse_listen("127.0.0.1:9000").unwrap(),
            (Some("127.0.0.1".to_string()), 9000)
        );
        assert_eq!(parse_listen(":80").unwrap(), (None, 80));
        assert_eq!(parse_listen("[::1]:81").unwrap(), (Some("::1".to_string()), 81));
        assert!(parse_listen("localhost").is_err());
        assert!(parse_listen("localhost:http").is_err());
    }

    #[test]
    fn gzip_policy_matches_substrings() {
        let cfg = Config {
            gzip_mime_types: vec!["text/".into(), "/JSON".into()],
            ..Config::default()
        };
        let policy = cfg.gzip_policy();
        assert!(policy("text/html; charset=UTF-8"));
        assert!(policy("application/json"));
        assert!(!policy("image/png"));
    }
}
