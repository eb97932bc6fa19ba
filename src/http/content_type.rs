//! `Content-Type` header values and the few charsets the server handles.

use std::sync::LazyLock;

use regex::Regex;

const MULTIPART_FORM_DATA: &str = "multipart/form-data";

static MIME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[ \t]*([^/ ;,]+/[^ ;,]+)").expect("valid mime regex"));

static CHARSET_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)[ \t]*charset[ \t]*=[ \t]*['"]?([^"';,]*)['"]?"#).expect("valid charset regex")
});

static BOUNDARY_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)[ \t]*boundary[ \t]*=[ \t]*['"]?([^"';,]*)['"]?"#)
        .expect("valid boundary regex")
});

/// Character sets used to decode form text and encode text responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Charset {
    UsAscii,
    Iso8859_1,
    Utf8,
}

impl Charset {
    /// Looks a charset up by its (case-insensitive) label.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "us-ascii" | "ascii" | "iso646-us" => Some(Charset::UsAscii),
            "iso-8859-1" | "latin1" | "iso8859-1" | "iso_8859-1" => Some(Charset::Iso8859_1),
            "utf-8" | "utf8" => Some(Charset::Utf8),
            _ => None,
        }
    }

    /// Decodes bytes, replacing anything the charset cannot represent with
    /// U+FFFD.
    pub fn decode(&self, bytes: &[u8]) -> String {
        match self {
            Charset::UsAscii => bytes
                .iter()
                .map(|&b| if b.is_ascii() { b as char } else { '\u{FFFD}' })
                .collect(),
            Charset::Iso8859_1 => bytes.iter().map(|&b| b as char).collect(),
            Charset::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
        }
    }

    pub fn can_encode(&self, text: &str) -> bool {
        match self {
            Charset::UsAscii => text.is_ascii(),
            Charset::Iso8859_1 => text.chars().all(|c| (c as u32) <= 0xFF),
            Charset::Utf8 => true,
        }
    }

    /// Encodes text, substituting `?` for unrepresentable characters.
    pub fn encode(&self, text: &str) -> Vec<u8> {
        match self {
            Charset::UsAscii => text
                .chars()
                .map(|c| if c.is_ascii() { c as u8 } else { b'?' })
                .collect(),
            Charset::Iso8859_1 => text
                .chars()
                .map(|c| u8::try_from(c as u32).unwrap_or(b'?'))
                .collect(),
            Charset::Utf8 => text.as_bytes().to_vec(),
        }
    }
}

/// A parsed `Content-Type` value.
///
/// Keeps the original header text so it can be re-emitted verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentType {
    header: Option<String>,
    media_type: String,
    charset: Option<String>,
    boundary: Option<String>,
}

impl ContentType {
    pub fn parse(header: Option<&str>) -> Self {
        let Some(raw) = header else {
            return Self {
                header: None,
                media_type: String::new(),
                charset: Some("UTF-8".to_string()),
                boundary: None,
            };
        };

        let media_type = MIME_PATTERN
            .captures(raw)
            .map(|c| c[1].to_string())
            .unwrap_or_default();
        let charset = CHARSET_PATTERN.captures(raw).map(|c| c[1].to_string());
        let boundary = if media_type.eq_ignore_ascii_case(MULTIPART_FORM_DATA) {
            BOUNDARY_PATTERN.captures(raw).map(|c| c[1].to_string())
        } else {
            None
        };

        Self {
            header: Some(raw.to_string()),
            media_type,
            charset,
            boundary,
        }
    }

    /// Full header text as received (or as built by [`ContentType::try_utf8`]).
    pub fn header(&self) -> Option<&str> {
        self.header.as_deref()
    }

    /// `type/subtype`, empty when absent or unrecognisable.
    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    /// Declared charset label, `US-ASCII` when none was given.
    pub fn encoding(&self) -> &str {
        self.charset.as_deref().unwrap_or("US-ASCII")
    }

    /// Resolved charset, `None` for a label we do not support.
    pub fn charset(&self) -> Option<Charset> {
        Charset::from_label(self.encoding())
    }

    pub fn boundary(&self) -> Option<&str> {
        self.boundary.as_deref()
    }

    pub fn is_multipart(&self) -> bool {
        self.media_type.eq_ignore_ascii_case(MULTIPART_FORM_DATA)
    }

    pub fn is_form_urlencoded(&self) -> bool {
        self.media_type
            .eq_ignore_ascii_case("application/x-www-form-urlencoded")
    }

    /// Rewrites the declared charset, if any, to UTF-8.
    pub fn force_utf8(&self) -> Self {
        match (&self.charset, &self.header) {
            (Some(_), Some(header)) => {
                ContentType::parse(Some(&CHARSET_PATTERN.replace(header, " charset=UTF-8")))
            }
            _ => self.try_utf8(),
        }
    }

    /// Declares UTF-8 when no charset was given; otherwise unchanged.
    pub fn try_utf8(&self) -> Self {
        match (&self.charset, &self.header) {
            (None, Some(header)) => ContentType::parse(Some(&format!("{header}; charset=UTF-8"))),
            _ => self.clone(),
        }
    }
}
