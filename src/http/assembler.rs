//! Incremental request framing.
//!
//! A connection's bytes arrive in segments of at most one read buffer each,
//! split at arbitrary points. [`RequestAssembler`] accumulates them until a
//! complete request (header block plus any declared body) is present, hands
//! that request out, and keeps whatever follows for the next one.

use crate::http::parser::{
    DEFAULT_MAX_HEADER_BYTES, ParseError, find_headers_end, parse_http_request_limited,
};
use crate::http::request::Request;

/// Per-connection framing state.
#[derive(Debug)]
pub struct RequestAssembler {
    buffer: Vec<u8>,
    /// Offset up to which `buffer` is known not to contain a terminator.
    scanned: usize,
    max_header_bytes: usize,
}

impl Default for RequestAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestAssembler {
    pub fn new() -> Self {
        Self::with_limit(DEFAULT_MAX_HEADER_BYTES)
    }

    pub fn with_limit(max_header_bytes: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(4096),
            scanned: 0,
            max_header_bytes,
        }
    }

    /// Appends one segment, in arrival order.
    pub fn push(&mut self, segment: &[u8]) {
        self.buffer.extend_from_slice(segment);
    }

    /// Takes the next complete request out of the buffer.
    ///
    /// `Ok(None)` means more bytes are needed. On a parse error the buffered
    /// bytes are discarded so the connection can start over cleanly.
    pub fn next_request(&mut self) -> Result<Option<Request>, ParseError> {
        // A terminator can straddle the previous scan boundary by up to 3 bytes.
        let from = self.scanned.saturating_sub(3);
        if find_headers_end(&self.buffer[from..]).is_none() {
            self.scanned = self.buffer.len();
            if self.buffer.len() > self.max_header_bytes {
                self.reset();
                return Err(ParseError::HeadersTooLarge);
            }
            return Ok(None);
        }

        match parse_http_request_limited(&self.buffer, self.max_header_bytes) {
            Ok((request, consumed)) => {
                self.buffer.drain(..consumed);
                self.scanned = 0;
                Ok(Some(request))
            }
            // Header block is in, body is still arriving.
            Err(ParseError::Incomplete) => Ok(None),
            Err(e) => {
                self.reset();
                Err(e)
            }
        }
    }

    /// True when no partial request is buffered.
    pub fn is_idle(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Number of bytes held for the request in progress.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    fn reset(&mut self) {
        self.buffer.clear();
        self.scanned = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminator_split_across_scan_boundary() {
        let mut asm = RequestAssembler::new();
        asm.push(b"GET / HTTP/1.1\r\nHost: a\r\n\r");
        assert!(asm.next_request().unwrap().is_none());
        assert_eq!(asm.scanned, asm.buffered());

        asm.push(b"\n");
        let req = asm.next_request().unwrap().unwrap();
        assert_eq!(req.path, "/");
        assert!(asm.is_idle());
    }
}
