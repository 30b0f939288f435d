use bytes::Bytes;
use std::io::{self, Write};

/// One outbound buffer and how much of it has reached the socket.
#[derive(Debug)]
pub struct PendingWrite {
    buffer: Bytes,
    written: usize,
}

impl PendingWrite {
    pub fn new(buffer: Bytes) -> Self {
        Self { buffer, written: 0 }
    }

    /// Writes as much as the stream accepts without blocking.
    ///
    /// Returns `Ok(true)` once the whole buffer is out and `Ok(false)` when the
    /// stream pushed back with `WouldBlock`; the cursor is kept so the next call
    /// resumes where this one stopped.
    pub fn write_to<W: Write>(&mut self, stream: &mut W) -> io::Result<bool> {
        while self.written < self.buffer.len() {
            match stream.write(&self.buffer[self.written..]) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "connection closed while writing",
                    ));
                }
                Ok(n) => self.written += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(false),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }

        Ok(true)
    }

    pub fn is_done(&self) -> bool {
        self.written >= self.buffer.len()
    }

    pub fn remaining(&self) -> usize {
        self.buffer.len() - self.written
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Accepts at most `budget` bytes, then reports `WouldBlock`.
    struct Throttled {
        out: Vec<u8>,
        budget: usize,
    }

    impl Write for Throttled {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.budget == 0 {
                return Err(io::ErrorKind::WouldBlock.into());
            }
            let n = buf.len().min(self.budget).min(3);
            self.out.extend_from_slice(&buf[..n]);
            self.budget -= n;
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn resumes_after_back_pressure() {
        let mut pending = PendingWrite::new(Bytes::from_static(b"hello world"));
        let mut sink = Throttled { out: Vec::new(), budget: 5 };

        assert!(!pending.write_to(&mut sink).unwrap());
        assert_eq!(pending.remaining(), 6);

        sink.budget = 100;
        assert!(pending.write_to(&mut sink).unwrap());
        assert!(pending.is_done());
        assert_eq!(sink.out, b"hello world");
    }

    #[test]
    fn zero_length_write_is_fatal() {
        let mut pending = PendingWrite::new(Bytes::from_static(b"x"));
        let mut full: &mut [u8] = &mut [];
        let err = pending.write_to(&mut full).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WriteZero);
    }
}
