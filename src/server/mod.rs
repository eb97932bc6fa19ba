//! Listening socket, connection execution and request-scoped temp files.

pub mod executor;
pub mod listener;
pub mod tempfile;

pub use executor::{DefaultExecutor, Executor};
pub use listener::{PlainAcceptor, Server, SocketAcceptor};
