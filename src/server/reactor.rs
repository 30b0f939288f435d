//! The reactor: one thread, one poller, every socket.
//!
//! Each turn of the loop applies queued interest changes, waits for
//! readiness, then services ready sockets: accept new connections, read and
//! forward bytes to the owning worker, or flush outbound queues. All socket
//! writes happen here. A failure on one connection closes that connection
//! and nothing else.

use crate::http::writer::PendingWrite;
use crate::server::changes::{ChangeQueue, Interest};
use crate::server::outbox::{OutboundQueue, Outbox};
use crate::server::worker::{InboundSegment, ResponseSink, WorkerMessage, WorkerPool};
use crate::server::ConnectionId;
use bytes::Bytes;
use mio::event::Event;
use mio::net::{TcpListener, TcpStream};
use mio::{Events, Poll, Token, Waker};
use std::collections::HashMap;
use std::io::{self, Read};
use std::net::SocketAddr;
use std::sync::Arc;

const LISTENER: Token = Token(0);
const WAKER: Token = Token(usize::MAX);

const EVENTS_CAPACITY: usize = 1024;

/// Cloneable handle workers use to reach the reactor.
#[derive(Clone)]
pub struct ReactorHandle {
    changes: Arc<ChangeQueue>,
    outbox: Arc<Outbox>,
}

impl ResponseSink for ReactorHandle {
    /// Queues the bytes, then asks for write interest on the connection.
    fn send(&self, conn: ConnectionId, data: Bytes) {
        if self.outbox.push(conn, data) {
            self.changes.request_interest_change(conn, Interest::Write);
        } else {
            tracing::debug!(conn = %conn, "Dropping output for closed connection");
        }
    }

    /// Closes the connection after its queued output has been written.
    fn close(&self, conn: ConnectionId) {
        if self.outbox.is_open(conn) {
            self.changes.request_close(conn);
        }
    }
}

struct Connection {
    stream: TcpStream,
    peer: SocketAddr,
    worker: usize,
    outbound: Arc<OutboundQueue>,
    /// Head buffer that did not fit in the socket last time.
    in_flight: Option<PendingWrite>,
    /// Set by a close request; the socket closes once the queue drains.
    closing: bool,
}

enum ReadOutcome {
    Open,
    Eof,
}

enum WriteOutcome {
    Pending,
    Flushed,
    /// Queue drained on a connection that asked to close.
    Finished,
}

pub struct Reactor {
    poll: Poll,
    listener: TcpListener,
    connections: HashMap<ConnectionId, Connection>,
    next_id: usize,
    /// Reused for every read; segments are copied out before handoff.
    scratch: Vec<u8>,
    changes: Arc<ChangeQueue>,
    outbox: Arc<Outbox>,
}

impl Reactor {
    pub fn bind(addr: SocketAddr, read_buffer_size: usize) -> io::Result<Self> {
        let poll = Poll::new()?;
        let mut listener = TcpListener::bind(addr)?;
        poll.registry()
            .register(&mut listener, LISTENER, mio::Interest::READABLE)?;

        let waker = Waker::new(poll.registry(), WAKER)?;

        Ok(Self {
            poll,
            listener,
            connections: HashMap::new(),
            next_id: 1,
            scratch: vec![0; read_buffer_size.max(1)],
            changes: Arc::new(ChangeQueue::new(waker)),
            outbox: Arc::new(Outbox::new()),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn handle(&self) -> ReactorHandle {
        ReactorHandle {
            changes: Arc::clone(&self.changes),
            outbox: Arc::clone(&self.outbox),
        }
    }

    /// Runs the event loop. Never returns.
    pub fn run(&mut self, pool: &WorkerPool) -> ! {
        let mut events = Events::with_capacity(EVENTS_CAPACITY);
        loop {
            self.turn(&mut events, pool);
        }
    }

    fn turn(&mut self, events: &mut Events, pool: &WorkerPool) {
        self.apply_changes(pool);

        if let Err(e) = self.poll.poll(events, None) {
            if e.kind() != io::ErrorKind::Interrupted {
                tracing::error!(error = %e, "Poll failed");
            }
            return;
        }

        for event in events.iter() {
            match event.token() {
                LISTENER => self.accept(pool),
                // Changes are picked up at the top of the next turn.
                WAKER => {}
                token => {
                    let id = ConnectionId(token.0);
                    if let Err(e) = self.ready(id, event, pool) {
                        tracing::warn!(conn = %id, error = %e, "Connection failed");
                        self.close(id, pool);
                    }
                }
            }
        }
    }

    fn apply_changes(&mut self, pool: &WorkerPool) {
        let mut failed = Vec::new();

        for change in self.changes.drain() {
            let Some(conn) = self.connections.get_mut(&change.conn) else {
                tracing::trace!(conn = %change.conn, "Ignoring change for closed connection");
                continue;
            };
            if change.close_after_flush {
                conn.closing = true;
            }

            if let Err(e) = self.poll.registry().reregister(
                &mut conn.stream,
                Token(change.conn.0),
                change.interest.into(),
            ) {
                tracing::warn!(conn = %change.conn, error = %e, "Failed to change interest");
                failed.push(change.conn);
            }
        }

        for id in failed {
            self.close(id, pool);
        }
    }

    fn accept(&mut self, pool: &WorkerPool) {
        loop {
            let (mut stream, peer) = match self.listener.accept() {
                Ok(accepted) => accepted,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    tracing::warn!(error = %e, "Accept failed");
                    return;
                }
            };

            let id = ConnectionId(self.next_id);
            self.next_id += 1;

            if let Err(e) =
                self.poll
                    .registry()
                    .register(&mut stream, Token(id.0), mio::Interest::READABLE)
            {
                tracing::warn!(conn = %id, peer = %peer, error = %e, "Failed to register connection");
                continue;
            }
            if let Err(e) = stream.set_nodelay(true) {
                tracing::trace!(conn = %id, error = %e, "Failed to set TCP_NODELAY");
            }

            let worker = pool.worker_for(id);
            let outbound = self.outbox.open(id);
            self.connections.insert(
                id,
                Connection {
                    stream,
                    peer,
                    worker,
                    outbound,
                    in_flight: None,
                    closing: false,
                },
            );

            tracing::debug!(conn = %id, peer = %peer, worker, "Accepted connection");
        }
    }

    fn ready(&mut self, id: ConnectionId, event: &Event, pool: &WorkerPool) -> io::Result<()> {
        if event.is_readable() {
            if let ReadOutcome::Eof = self.read(id, pool)? {
                tracing::debug!(conn = %id, "Closed by peer");
                self.close(id, pool);
                return Ok(());
            }
        }

        if event.is_writable() {
            if let WriteOutcome::Finished = self.write(id)? {
                tracing::debug!(conn = %id, "Closing after final response");
                self.close(id, pool);
            }
        }

        Ok(())
    }

    /// Reads until the socket is drained, forwarding each chunk as a segment.
    fn read(&mut self, id: ConnectionId, pool: &WorkerPool) -> io::Result<ReadOutcome> {
        let Some(conn) = self.connections.get_mut(&id) else {
            return Ok(ReadOutcome::Open);
        };

        loop {
            match conn.stream.read(&mut self.scratch) {
                Ok(0) => return Ok(ReadOutcome::Eof),
                Ok(n) => {
                    let segment = InboundSegment {
                        conn: id,
                        data: Bytes::copy_from_slice(&self.scratch[..n]),
                    };
                    if !pool.dispatch(conn.worker, WorkerMessage::Segment(segment)) {
                        return Err(io::Error::other("worker unavailable"));
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(ReadOutcome::Open),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Flushes the outbound queue in order. Stops at the first buffer the
    /// socket will not fully take; once empty, goes back to read interest
    /// unless the connection is closing.
    fn write(&mut self, id: ConnectionId) -> io::Result<WriteOutcome> {
        let Some(conn) = self.connections.get_mut(&id) else {
            return Ok(WriteOutcome::Pending);
        };

        loop {
            if conn.in_flight.is_none() {
                conn.in_flight = conn.outbound.pop().map(PendingWrite::new);
            }
            let Some(pending) = conn.in_flight.as_mut() else {
                break;
            };
            if !pending.write_to(&mut conn.stream)? {
                tracing::trace!(conn = %id, remaining = pending.remaining(), "Socket full");
                return Ok(WriteOutcome::Pending);
            }
            conn.in_flight = None;
        }

        if conn.closing {
            return Ok(WriteOutcome::Finished);
        }

        self.poll.registry().reregister(
            &mut conn.stream,
            Token(id.0),
            Interest::Read.into(),
        )?;
        Ok(WriteOutcome::Flushed)
    }

    fn close(&mut self, id: ConnectionId, pool: &WorkerPool) {
        let Some(mut conn) = self.connections.remove(&id) else {
            return;
        };

        if let Err(e) = self.poll.registry().deregister(&mut conn.stream) {
            tracing::trace!(conn = %id, error = %e, "Deregister failed");
        }
        self.outbox.close(id);
        pool.dispatch(conn.worker, WorkerMessage::Closed(id));

        tracing::debug!(conn = %id, peer = %conn.peer, "Connection closed");
    }

    /// Number of open client connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}
