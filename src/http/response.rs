use bytes::Bytes;
use std::collections::BTreeMap;

pub const HTTP_VERSION: &str = "HTTP/1.1";

pub const CONNECTION: &str = "Connection";
pub const CONTENT_ENCODING: &str = "Content-Encoding";
pub const CONTENT_LENGTH: &str = "Content-Length";
pub const CONTENT_TYPE: &str = "Content-Type";
pub const LAST_MODIFIED: &str = "Last-Modified";

pub const KEEP_ALIVE: &str = "keep-alive";
pub const GZIP: &str = "gzip";

/// HTTP status codes the server can answer with.
///
/// - `Ok` (200): the file was found and is in the body
/// - `NotFound` (404): the file could not be read
/// - `InternalServerError` (500): anything else went wrong
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    /// 200 OK
    Ok,
    /// 404 Not Found
    NotFound,
    /// 500 Internal Server Error
    InternalServerError,
}

impl StatusCode {
    /// Returns the numeric HTTP status code.
    ///
    /// ```
    /// # use staticd::http::response::StatusCode;
    /// assert_eq!(StatusCode::Ok.as_u16(), 200);
    /// assert_eq!(StatusCode::NotFound.as_u16(), 404);
    /// ```
    pub fn as_u16(&self) -> u16 {
        match self {
            StatusCode::Ok => 200,
            StatusCode::NotFound => 404,
            StatusCode::InternalServerError => 500,
        }
    }

    /// Returns the standard HTTP reason phrase for this status code.
    pub fn reason_phrase(&self) -> &'static str {
        match self {
            StatusCode::Ok => "OK",
            StatusCode::NotFound => "Not Found",
            StatusCode::InternalServerError => "Internal Server Error",
        }
    }

    /// The full status line without its terminator, e.g. `HTTP/1.1 200 OK`.
    pub fn status_line(&self) -> String {
        format!("{} {} {}", HTTP_VERSION, self.as_u16(), self.reason_phrase())
    }
}

/// Builds the header block of a response.
///
/// Headers are emitted sorted by name, so the same inputs always serialize
/// to the same bytes. Nothing is added implicitly: callers set every header,
/// `Content-Length` included.
///
/// ```
/// # use staticd::http::response::{ResponseHeaderBuilder, StatusCode};
/// let head = ResponseHeaderBuilder::new(StatusCode::NotFound)
///     .header("Content-Length", 0)
///     .build();
/// assert_eq!(&head[..], b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n");
/// ```
#[derive(Debug, Clone)]
pub struct ResponseHeaderBuilder {
    status: StatusCode,
    headers: BTreeMap<String, String>,
}

impl ResponseHeaderBuilder {
    /// Creates a new header builder with the specified status code.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
        }
    }

    /// Replaces the status code.
    pub fn status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    /// Adds or replaces a header.
    pub fn header(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.headers.insert(key.into(), value.to_string());
        self
    }

    /// Serializes status line, headers and the terminating blank line.
    pub fn build(&self) -> Bytes {
        let mut buf = Vec::with_capacity(128);

        buf.extend_from_slice(self.status.status_line().as_bytes());
        buf.extend_from_slice(b"\r\n");

        for (k, v) in &self.headers {
            buf.extend_from_slice(k.as_bytes());
            buf.extend_from_slice(b": ");
            buf.extend_from_slice(v.as_bytes());
            buf.extend_from_slice(b"\r\n");
        }

        // Header/body separator
        buf.extend_from_slice(b"\r\n");

        Bytes::from(buf)
    }
}

/// Header block for a 404 or 500: keep-alive and an empty body.
pub fn empty_response(status: StatusCode) -> Bytes {
    ResponseHeaderBuilder::new(status)
        .header(CONNECTION, KEEP_ALIVE)
        .header(CONTENT_LENGTH, 0)
        .build()
}
