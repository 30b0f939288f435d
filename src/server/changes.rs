//! Interest changes requested from other threads.
//!
//! Only the reactor may touch a socket's registration. Workers that have
//! queued output record the wish here and wake the reactor, which applies
//! every pending change before it polls again.

use crate::server::ConnectionId;
use mio::Waker;
use std::mem;
use std::sync::{Mutex, PoisonError};

/// Which readiness a connection waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interest {
    Read,
    Write,
}

impl From<Interest> for mio::Interest {
    fn from(interest: Interest) -> Self {
        match interest {
            Interest::Read => mio::Interest::READABLE,
            Interest::Write => mio::Interest::WRITABLE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeRequest {
    pub conn: ConnectionId,
    pub interest: Interest,
    /// Close the connection once its outbound queue is empty.
    pub close_after_flush: bool,
}

pub struct ChangeQueue {
    pending: Mutex<Vec<ChangeRequest>>,
    waker: Waker,
}

impl ChangeQueue {
    pub fn new(waker: Waker) -> Self {
        Self {
            pending: Mutex::new(Vec::new()),
            waker,
        }
    }

    /// Records the change and interrupts the reactor's wait.
    pub fn request_interest_change(&self, conn: ConnectionId, interest: Interest) {
        self.submit(ChangeRequest {
            conn,
            interest,
            close_after_flush: false,
        });
    }

    /// Asks for `conn` to be closed after everything queued so far is written.
    pub fn request_close(&self, conn: ConnectionId) {
        self.submit(ChangeRequest {
            conn,
            interest: Interest::Write,
            close_after_flush: true,
        });
    }

    fn submit(&self, change: ChangeRequest) {
        let conn = change.conn;
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(change);

        if let Err(e) = self.waker.wake() {
            tracing::warn!(conn = %conn, error = %e, "Failed to wake reactor");
        }
    }

    /// Takes every pending change, in request order, leaving the queue empty.
    pub fn drain(&self) -> Vec<ChangeRequest> {
        mem::take(&mut *self.pending.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mio::{Events, Poll, Token};
    use std::time::Duration;

    #[test]
    fn drain_is_ordered_and_clears() {
        let poll = Poll::new().unwrap();
        let waker = Waker::new(poll.registry(), Token(usize::MAX)).unwrap();
        let queue = ChangeQueue::new(waker);

        queue.request_interest_change(ConnectionId(1), Interest::Write);
        queue.request_interest_change(ConnectionId(2), Interest::Read);
        queue.request_close(ConnectionId(1));

        let drained = queue.drain();
        assert_eq!(drained.len(), 3);
        assert_eq!(drained[0].conn, ConnectionId(1));
        assert!(!drained[0].close_after_flush);
        assert_eq!(drained[1].interest, Interest::Read);
        assert_eq!(drained[2].interest, Interest::Write);
        assert!(drained[2].close_after_flush);
        assert!(queue.drain().is_empty());
    }

    #[test]
    fn request_wakes_the_poller() {
        let mut poll = Poll::new().unwrap();
        let waker = Waker::new(poll.registry(), Token(7)).unwrap();
        let queue = ChangeQueue::new(waker);

        queue.request_interest_change(ConnectionId(3), Interest::Write);

        let mut events = Events::with_capacity(4);
        poll.poll(&mut events, Some(Duration::from_secs(5))).unwrap();
        assert!(events.iter().any(|e| e.token() == Token(7)));
    }
}
