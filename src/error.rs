//! Request-level error taxonomy.
//!
//! Every fault raised while reading, parsing or decoding a request ends up as
//! an [`HttpError`]. Malformed input and internal faults are answered with a
//! short plain-text response before the connection is torn down; I/O faults
//! simply end the connection.

use crate::http::parser::ParseError;
use crate::http::response::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    /// The client sent something we cannot interpret (400).
    #[error("BAD REQUEST: {0}")]
    MalformedRequest(String),

    /// The server failed while handling an otherwise valid request (500).
    #[error("SERVER INTERNAL ERROR: {0}")]
    Internal(String),

    /// Socket read/write failure, EOF or timeout. Never reported to the peer.
    #[error("connection I/O: {0}")]
    Io(#[from] std::io::Error),
}

impl HttpError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        HttpError::MalformedRequest(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        HttpError::Internal(msg.into())
    }

    /// Status to report to the client, or `None` when the connection should
    /// just be dropped.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            HttpError::MalformedRequest(_) => Some(StatusCode::BadRequest),
            HttpError::Internal(_) => Some(StatusCode::InternalServerError),
            HttpError::Io(_) => None,
        }
    }
}

impl From<ParseError> for HttpError {
    fn from(err: ParseError) -> Self {
        match err {
            ParseError::InvalidRequest => {
                HttpError::malformed("Syntax error. Usage: GET /example/file.html")
            }
            ParseError::MissingUri => {
                HttpError::malformed("Missing URI. Usage: GET /example/file.html")
            }
            ParseError::InvalidMethod(verb) => {
                HttpError::malformed(format!("Syntax error. HTTP verb {verb} unhandled."))
            }
            ParseError::HeaderTooLarge => {
                HttpError::malformed("Request header exceeds the 8192 byte buffer.")
            }
            ParseError::Incomplete => HttpError::malformed("Incomplete request header."),
        }
    }
}

pub type HttpResult<T> = Result<T, HttpError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(
            HttpError::malformed("x").status(),
            Some(StatusCode::BadRequest)
        );
        assert_eq!(
            HttpError::internal("x").status(),
            Some(StatusCode::InternalServerError)
        );
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        assert_eq!(HttpError::from(io).status(), None);
    }

    #[test]
    fn unknown_verb_message_names_the_verb() {
        let err: HttpError = ParseError::InvalidMethod("BREW".into()).into();
        assert_eq!(err.to_string(), "BAD REQUEST: Syntax error. HTTP verb BREW unhandled.");
    }
}
