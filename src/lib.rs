//! staticd - static file server on a readiness reactor
//!
//! One reactor thread multiplexes every socket, a fixed pool of workers frames
//! requests and builds responses, and a bounded cache keeps built responses
//! for repeat requests.

pub mod cache;
pub mod config;
pub mod files;
pub mod http;
pub mod server;
