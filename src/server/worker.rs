//! Request workers.
//!
//! A fixed set of threads, each with its own inbox. Every connection is bound
//! to one worker when it is accepted, so all of its segments go through the
//! same FIFO and reach the same [`RequestAssembler`] in read order. No lock
//! is held on per-connection state.

use crate::files::StaticFiles;
use crate::http::assembler::RequestAssembler;
use crate::http::request::Request;
use crate::http::response::{StatusCode, empty_response};
use crate::server::ConnectionId;
use bytes::Bytes;
use crossbeam_channel::{Receiver, Sender};
use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::Arc;
use std::thread;

/// Where workers hand finished response bytes.
pub trait ResponseSink: Send + Sync {
    /// Queues `data` for `conn` behind anything queued before it.
    fn send(&self, conn: ConnectionId, data: Bytes);

    /// Closes `conn` once everything queued before this call has gone out.
    fn close(&self, conn: ConnectionId);
}

/// Bytes read from one connection, copied out of the reactor's buffer.
#[derive(Debug, Clone)]
pub struct InboundSegment {
    pub conn: ConnectionId,
    pub data: Bytes,
}

#[derive(Debug, Clone)]
pub enum WorkerMessage {
    Segment(InboundSegment),
    /// The connection is gone; drop its framing state.
    Closed(ConnectionId),
}

pub struct Worker<S> {
    id: usize,
    inbox: Receiver<WorkerMessage>,
    requests: HashMap<ConnectionId, RequestAssembler>,
    /// Connections that asked to close; their later input is dropped.
    finishing: HashSet<ConnectionId>,
    files: Arc<StaticFiles>,
    sink: S,
    max_header_bytes: usize,
}

impl<S: ResponseSink> Worker<S> {
    pub fn new(
        id: usize,
        inbox: Receiver<WorkerMessage>,
        files: Arc<StaticFiles>,
        sink: S,
        max_header_bytes: usize,
    ) -> Self {
        Self {
            id,
            inbox,
            requests: HashMap::new(),
            finishing: HashSet::new(),
            files,
            sink,
            max_header_bytes,
        }
    }

    /// Processes messages until every sender is gone.
    pub fn run(mut self) {
        tracing::debug!(worker = self.id, "Worker started");
        while let Ok(message) = self.inbox.recv() {
            self.handle(message);
        }
        tracing::debug!(worker = self.id, "Worker inbox closed");
    }

    pub fn handle(&mut self, message: WorkerMessage) {
        match message {
            WorkerMessage::Segment(segment) => self.on_segment(segment),
            WorkerMessage::Closed(conn) => {
                self.requests.remove(&conn);
                self.finishing.remove(&conn);
            }
        }
    }

    /// Connections with framing state held by this worker.
    pub fn tracked(&self) -> usize {
        self.requests.len()
    }

    fn on_segment(&mut self, segment: InboundSegment) {
        let conn = segment.conn;
        if self.finishing.contains(&conn) {
            tracing::trace!(worker = self.id, conn = %conn, "Dropping input after close request");
            return;
        }

        let limit = self.max_header_bytes;
        let assembler = self
            .requests
            .entry(conn)
            .or_insert_with(|| RequestAssembler::with_limit(limit));

        assembler.push(&segment.data);

        let mut close = false;
        loop {
            match assembler.next_request() {
                Ok(Some(request)) => {
                    respond(&self.files, &self.sink, conn, &request);
                    if !request.keep_alive() {
                        close = true;
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::error!(worker = self.id, conn = %conn, error = ?e, "Malformed request");
                    self.sink
                        .send(conn, empty_response(StatusCode::InternalServerError));
                    break;
                }
            }
        }

        if close {
            self.requests.remove(&conn);
            self.finishing.insert(conn);
            self.sink.close(conn);
        }
    }
}

fn respond<S: ResponseSink>(files: &StaticFiles, sink: &S, conn: ConnectionId, request: &Request) {
    tracing::debug!(
        conn = %conn,
        method = %request.method,
        path = %request.path,
        "Request complete"
    );

    let served = files.respond(request);

    sink.send(conn, served.header);
    if request.method.sends_body() && !served.body.is_empty() {
        sink.send(conn, served.body);
    }
}

/// The running workers and the senders feeding them.
pub struct WorkerPool {
    inboxes: Vec<Sender<WorkerMessage>>,
}

impl WorkerPool {
    /// Starts `count` named worker threads sharing `files` and `sink`.
    pub fn spawn<S>(
        count: usize,
        files: Arc<StaticFiles>,
        sink: S,
        max_header_bytes: usize,
    ) -> io::Result<Self>
    where
        S: ResponseSink + Clone + 'static,
    {
        let count = count.max(1);
        let mut inboxes = Vec::with_capacity(count);

        for id in 0..count {
            let (tx, rx) = crossbeam_channel::unbounded();
            let worker = Worker::new(id, rx, Arc::clone(&files), sink.clone(), max_header_bytes);

            thread::Builder::new()
                .name(format!("staticd-worker-{id}"))
                .spawn(move || worker.run())?;

            inboxes.push(tx);
        }

        Ok(Self { inboxes })
    }

    pub fn len(&self) -> usize {
        self.inboxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inboxes.is_empty()
    }

    /// The worker that owns `conn` for its whole lifetime.
    pub fn worker_for(&self, conn: ConnectionId) -> usize {
        conn.0 % self.inboxes.len()
    }

    /// Hands `message` to worker `worker`. Returns false if that worker has exited.
    pub fn dispatch(&self, worker: usize, message: WorkerMessage) -> bool {
        match self.inboxes.get(worker) {
            Some(inbox) => inbox.send(message).is_ok(),
            None => false,
        }
    }
}
