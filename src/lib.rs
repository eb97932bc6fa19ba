//! Lantern - embeddable HTTP/1.x server core
//!
//! Request parsing, body and multipart decoding, response framing and the
//! per-connection keep-alive loop. Applications plug in a [`http::handler::Handler`].

pub mod config;
pub mod error;
pub mod http;
pub mod server;
