//! Server configuration.
//!
//! Values are layered: built-in defaults, then an optional YAML file named by
//! `STATICD_CONFIG`, then `STATICD_*` environment variables, then the
//! positional launch arguments `[port] [root]`.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

pub const CONFIG_ENV: &str = "STATICD_CONFIG";
pub const PORT_ENV: &str = "STATICD_PORT";
pub const BIND_ENV: &str = "STATICD_BIND";
pub const ROOT_ENV: &str = "STATICD_ROOT";
pub const WORKERS_ENV: &str = "STATICD_WORKERS";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub port: u16,
    /// Interface to bind; all interfaces when unset.
    pub interface: Option<IpAddr>,
    /// Document root that request paths are appended to.
    pub root: PathBuf,
    pub workers: usize,
    /// Size of the reactor's scratch read buffer.
    pub read_buffer_size: usize,
    /// Largest header block a client may send. A declared body over the same
    /// size is refused with a 500 instead of being buffered.
    pub max_header_bytes: usize,
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Zero disables the cache.
    pub max_entries: usize,
    pub max_bytes: usize,
    /// Re-stat the file on every hit and rebuild when its mtime moved.
    pub revalidate: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            interface: None,
            root: PathBuf::from("."),
            workers: default_workers(),
            read_buffer_size: 8192,
            max_header_bytes: crate::http::parser::DEFAULT_MAX_HEADER_BYTES,
            cache: CacheConfig::default(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 1024,
            max_bytes: 64 * 1024 * 1024,
            revalidate: false,
        }
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

impl Config {
    /// Defaults, then the YAML file and environment overrides.
    pub fn load() -> Result<Self> {
        let mut cfg = match std::env::var(CONFIG_ENV) {
            Ok(path) => {
                let text = std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read config file {path}"))?;
                Self::from_yaml_str(&text)
                    .with_context(|| format!("Invalid config file {path}"))?
            }
            Err(_) => Self::default(),
        };

        cfg.apply_env()?;
        Ok(cfg)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let cfg: Config = serde_yaml::from_str(text)?;
        Ok(cfg.normalized())
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(port) = std::env::var(PORT_ENV) {
            self.port = port
                .parse()
                .with_context(|| format!("{PORT_ENV} is not a port: {port}"))?;
        }
        if let Ok(bind) = std::env::var(BIND_ENV) {
            self.interface = Some(
                bind.parse()
                    .with_context(|| format!("{BIND_ENV} is not an IP address: {bind}"))?,
            );
        }
        if let Ok(root) = std::env::var(ROOT_ENV) {
            self.root = PathBuf::from(root);
        }
        if let Ok(workers) = std::env::var(WORKERS_ENV) {
            self.workers = workers
                .parse()
                .with_context(|| format!("{WORKERS_ENV} is not a number: {workers}"))?;
        }
        *self = self.clone().normalized();
        Ok(())
    }

    /// Applies positional launch arguments: `[port] [root]`.
    pub fn apply_args<I, S>(&mut self, args: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut args = args.into_iter();
        if let Some(port) = args.next() {
            let port = port.as_ref();
            self.port = port
                .parse()
                .with_context(|| format!("Invalid port argument: {port}"))?;
        }
        if let Some(root) = args.next() {
            self.root = PathBuf::from(root.as_ref());
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> SocketAddr {
        let ip = self
            .interface
            .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        SocketAddr::new(ip, self.port)
    }

    fn normalized(mut self) -> Self {
        if self.workers == 0 {
            self.workers = default_workers();
        }
        if self.read_buffer_size == 0 {
            self.read_buffer_size = Config::default().read_buffer_size;
        }
        self
    }
}
