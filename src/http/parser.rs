use crate::http::request::{Method, Request};
use std::collections::HashMap;

/// Header blocks larger than this are rejected unless a caller picks its own limit.
pub const DEFAULT_MAX_HEADER_BYTES: usize = 64 * 1024;

const TERMINATOR: &[u8] = b"\r\n\r\n";

#[derive(Debug, PartialEq, Eq)]
pub enum ParseError {
    InvalidRequest,
    InvalidMethod,
    InvalidHeader,
    InvalidContentLength,
    HeadersTooLarge,
    /// More bytes are needed, either for the header block or the body.
    Incomplete,
}

/// Parses one request from the front of `buf`.
///
/// Returns the request and the number of bytes it occupied, so the caller can
/// drop exactly that prefix and keep whatever follows for the next request.
pub fn parse_http_request(buf: &[u8]) -> Result<(Request, usize), ParseError> {
    parse_http_request_limited(buf, DEFAULT_MAX_HEADER_BYTES)
}

/// Same as [`parse_http_request`] with an explicit size limit.
///
/// The limit bounds the header block and, separately, any declared body.
/// A body over the limit is rejected as soon as its length is known rather
/// than buffered.
pub fn parse_http_request_limited(
    buf: &[u8],
    max_header_bytes: usize,
) -> Result<(Request, usize), ParseError> {
    let head_len = match find_headers_end(buf) {
        Some(end) if end <= max_header_bytes => end,
        Some(_) => return Err(ParseError::HeadersTooLarge),
        None if buf.len() > max_header_bytes => return Err(ParseError::HeadersTooLarge),
        None => return Err(ParseError::Incomplete),
    };

    let head = std::str::from_utf8(&buf[..head_len]).map_err(|_| ParseError::InvalidRequest)?;
    let mut lines = head.split("\r\n");

    let (method, path, version) = parse_request_line(lines.next().unwrap_or_default())?;

    let mut headers = HashMap::new();
    for line in lines.filter(|l| !l.is_empty()) {
        let (name, value) = parse_header_line(line)?;
        headers.insert(name, value);
    }

    let body_len = declared_body_len(&headers, max_header_bytes)?;

    let body_start = head_len + TERMINATOR.len();
    let end = body_start
        .checked_add(body_len)
        .ok_or(ParseError::InvalidContentLength)?;
    if buf.len() < end {
        return Err(ParseError::Incomplete);
    }

    let request = Request {
        method,
        path: path.to_owned(),
        version: version.to_owned(),
        headers,
        body: buf[body_start..end].to_vec(),
    };
    Ok((request, end))
}

fn declared_body_len(
    headers: &HashMap<String, String>,
    limit: usize,
) -> Result<usize, ParseError> {
    let Some(value) = headers.get("content-length") else {
        return Ok(0);
    };

    match value.parse::<usize>() {
        Ok(len) if len <= limit => Ok(len),
        _ => Err(ParseError::InvalidContentLength),
    }
}

/// `METHOD SP target SP version`. Extra whitespace between parts is tolerated.
fn parse_request_line(line: &str) -> Result<(Method, &str, &str), ParseError> {
    let mut parts = line.split_whitespace();
    let (Some(method), Some(path), Some(version)) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(ParseError::InvalidRequest);
    };

    let method = Method::from_str(method).ok_or(ParseError::InvalidMethod)?;
    Ok((method, path, version))
}

fn parse_header_line(line: &str) -> Result<(String, String), ParseError> {
    let (name, value) = line.split_once(':').ok_or(ParseError::InvalidHeader)?;
    Ok((name.trim().to_ascii_lowercase(), value.trim().to_owned()))
}

/// Offset of the blank line ending the header block, if present.
pub(crate) fn find_headers_end(buf: &[u8]) -> Option<usize> {
    buf.windows(TERMINATOR.len()).position(|w| w == TERMINATOR)
}
