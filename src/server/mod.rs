//! Server wiring.
//!
//! ```text
//!   ┌──────────────┐ segments ┌──────────────┐  send  ┌──────────────┐
//!   │   Reactor    │ ───────→ │  Worker[i]   │ ─────→ │ Outbox +     │
//!   │ (mio poll)   │          │ (assembler,  │        │ ChangeQueue  │
//!   │              │ ←─────── │  cache)      │        │              │
//!   └──────────────┘  wakeup  └──────────────┘        └──────────────┘
//! ```
//!
//! The reactor owns every socket. Workers never write to a socket: they queue
//! bytes in the outbox and ask the reactor, through the change queue, to wait
//! for writability.

pub mod changes;
pub mod outbox;
pub mod reactor;
pub mod worker;

use crate::cache::ResponseCache;
use crate::config::Config;
use crate::files::StaticFiles;
use anyhow::{Context, Result};
use reactor::Reactor;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread;
use worker::WorkerPool;

/// Identifies one accepted connection. Never reused within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub usize);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

pub struct Server {
    reactor: Reactor,
    pool: WorkerPool,
}

impl Server {
    /// Binds the listener and starts the worker threads.
    pub fn bind(config: &Config) -> Result<Self> {
        let addr = config.listen_addr();
        let reactor = Reactor::bind(addr, config.read_buffer_size)
            .with_context(|| format!("Failed to listen on {addr}"))?;

        let cache = Arc::new(ResponseCache::new(&config.cache));
        let files = Arc::new(StaticFiles::new(
            &config.root,
            cache,
            config.cache.revalidate,
        ));

        let pool = WorkerPool::spawn(
            config.workers,
            files,
            reactor.handle(),
            config.max_header_bytes,
        )
        .context("Failed to start workers")?;

        tracing::info!(
            addr = %reactor.local_addr().unwrap_or(addr),
            root = %config.root.display(),
            workers = pool.len(),
            "Listening"
        );

        Ok(Self { reactor, pool })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.reactor.local_addr()?)
    }

    /// Runs the reactor on the calling thread. The loop never exits.
    pub fn run(mut self) -> Result<()> {
        self.reactor.run(&self.pool)
    }

    /// Runs the reactor on its own thread and returns the bound address.
    pub fn spawn(self) -> Result<SocketAddr> {
        let addr = self.local_addr()?;
        thread::Builder::new()
            .name("staticd-reactor".to_string())
            .spawn(move || self.run())
            .context("Failed to start reactor thread")?;
        Ok(addr)
    }
}
