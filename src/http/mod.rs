//! HTTP/1.x protocol engine.
//!
//! # Architecture
//!
//! - **`connection`**: per-connection loop driving parse → handle → respond cycles
//! - **`parser`**: request line and header parsing, query-string decoding
//! - **`body`**: body length, memory/disk staging and form dispatch
//! - **`multipart`**: `multipart/form-data` boundary scan and part decoding
//! - **`request`** / **`response`**: the values exchanged with the handler
//! - **`writer`** / **`chunked`**: response framing (fixed, chunked, gzip)
//! - **`handler`**: the application callback
//! - **`headers`**, **`cookie`**, **`content_type`**, **`cursor`**, **`mime`**: supporting types
//!
//! # Connection State Machine
//!
//! ```text
//!        ┌─────────────┐
//!        │   Reading   │ ← read and parse the request head
//!        └──────┬──────┘
//!               │ head parsed           (malformed → fault response)
//!               ▼
//!        ┌──────────────────┐
//!        │   Processing     │ ← stage and decode the body, call the handler
//!        └──────┬───────────┘
//!               │ response ready
//!               ▼
//!        ┌──────────────────┐
//!        │    Writing       │ ← frame and send, then drop request temp files
//!        └──────┬───────────┘
//!               ├─ keep-alive → Reading (same connection)
//!               └─ close / fault / EOF / timeout → Closed
//! ```

pub mod body;
pub mod chunked;
pub mod connection;
pub mod content_type;
pub mod cookie;
pub mod cursor;
pub mod handler;
pub mod headers;
pub mod mime;
pub mod multipart;
pub mod parser;
pub mod request;
pub mod response;
pub mod writer;
