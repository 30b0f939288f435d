//! Per-connection outbound queues.
//!
//! Each open connection has one FIFO of byte buffers. Its worker is the only
//! producer and the reactor the only consumer, so the queue itself is a
//! lock-free `SegQueue`; the map around it is locked only to add or remove
//! a connection.

use crate::server::ConnectionId;
use bytes::Bytes;
use crossbeam_queue::SegQueue;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

pub type OutboundQueue = SegQueue<Bytes>;

#[derive(Default)]
pub struct Outbox {
    queues: RwLock<HashMap<ConnectionId, Arc<OutboundQueue>>>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the queue for a new connection. The reactor keeps the
    /// returned handle and pops from it directly.
    pub fn open(&self, conn: ConnectionId) -> Arc<OutboundQueue> {
        let queue = Arc::new(SegQueue::new());
        self.queues
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(conn, Arc::clone(&queue));
        queue
    }

    pub fn close(&self, conn: ConnectionId) {
        self.queues
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&conn);
    }

    /// Appends `data` behind everything already queued for `conn`.
    ///
    /// Returns false when the connection is no longer open.
    pub fn push(&self, conn: ConnectionId, data: Bytes) -> bool {
        let queues = self.queues.read().unwrap_or_else(PoisonError::into_inner);
        match queues.get(&conn) {
            Some(queue) => {
                queue.push(data);
                true
            }
            None => false,
        }
    }

    pub fn is_open(&self, conn: ConnectionId) -> bool {
        self.queues
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&conn)
    }
}
