//! HTTP/1.1 protocol pieces.
//!
//! Nothing in here touches a socket. The reactor moves bytes, the workers
//! feed them through these types:
//!
//! - **`assembler`**: per-connection framing, turns arbitrary segments into requests
//! - **`parser`**: parses one request from the front of a byte buffer
//! - **`request`**: HTTP request representation with case-insensitive headers
//! - **`response`**: status codes and the canonical header block builder
//! - **`writer`**: one outbound buffer with a resumable write cursor
//! - **`mime`**: MIME type detection based on file extensions
//!
//! # Request framing
//!
//! ```text
//!        ┌────────────────┐
//!        │  Accumulating  │ ← segments appended in arrival order
//!        └───────┬────────┘
//!                │ "\r\n\r\n" seen and declared body present
//!                ▼
//!        ┌────────────────┐
//!        │    Complete    │ ← request handed to the worker
//!        └───────┬────────┘
//!                │ consumed prefix dropped
//!                └─ back to Accumulating (same connection)
//! ```

pub mod assembler;
pub mod mime;
pub mod parser;
pub mod request;
pub mod response;
pub mod writer;
