//! Static file responses.
//!
//! Turns a parsed request into the header block and body to send back:
//! resolve the target under the document root, pick the representation
//! (plain or gzip), then serve it from the cache or build and store it.

use crate::cache::{CacheEntry, CacheKey, ResponseCache};
use crate::http::mime;
use crate::http::request::Request;
use crate::http::response::{
    CONNECTION, CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE, GZIP, KEEP_ALIVE, LAST_MODIFIED,
    ResponseHeaderBuilder, StatusCode, empty_response,
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use flate2::Compression;
use flate2::write::GzEncoder;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServeError {
    #[error("cannot read {path}: {source}")]
    NotFound {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid request target {0:?}")]
    BadTarget(String),
    #[error("failed to gzip {path}: {source}")]
    Encoding {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ServeError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServeError::NotFound { .. } => StatusCode::NotFound,
            ServeError::BadTarget(_) | ServeError::Encoding { .. } => {
                StatusCode::InternalServerError
            }
        }
    }
}

/// What to put on the wire for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Served {
    pub header: Bytes,
    /// Empty for 404/500 responses.
    pub body: Bytes,
}

impl Served {
    fn from_entry(entry: &CacheEntry) -> Self {
        Self {
            header: entry.header.clone(),
            body: entry.body.clone(),
        }
    }
}

pub struct StaticFiles {
    root: PathBuf,
    cache: Arc<ResponseCache>,
    revalidate: bool,
}

impl StaticFiles {
    pub fn new(root: impl Into<PathBuf>, cache: Arc<ResponseCache>, revalidate: bool) -> Self {
        Self {
            root: root.into(),
            cache,
            revalidate,
        }
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    /// Maps a request target onto a path under the document root.
    ///
    /// The query string and fragment are dropped and the path is
    /// percent-decoded. Targets that would climb above the root are refused.
    pub fn resolve(&self, target: &str) -> Result<PathBuf, ServeError> {
        let base = url::Url::parse("http://localhost/").map_err(|_| bad_target(target))?;
        let url = base.join(target).map_err(|_| bad_target(target))?;
        let decoded = urlencoding::decode(url.path()).map_err(|_| bad_target(target))?;

        let relative = Path::new(decoded.trim_start_matches('/'));
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(bad_target(target));
        }

        Ok(self.root.join(relative))
    }

    /// Builds the response for `request`. Never fails: errors become
    /// 404 or 500 header blocks with an empty body.
    pub fn respond(&self, request: &Request) -> Served {
        let path = match self.resolve(&request.path) {
            Ok(path) => path,
            Err(e) => return self.failure(e, None),
        };

        let content_type = mime::content_type_for(&path);
        let gzip = mime::is_text(&content_type) && request.accepts_gzip();
        let key = CacheKey::new(&path, gzip);

        if let Some(entry) = self.lookup(&key) {
            tracing::debug!(key = %key, "Cache hit");
            return Served::from_entry(&entry);
        }

        tracing::info!(key = %key, content_type = %content_type, "Cache miss");

        match build_entry(&path, &content_type, gzip) {
            Ok(entry) => {
                let served = Served::from_entry(&entry);
                self.cache.put(key, entry);
                served
            }
            Err(e) => self.failure(e, Some(key)),
        }
    }

    fn lookup(&self, key: &CacheKey) -> Option<Arc<CacheEntry>> {
        let entry = self.cache.get(key)?;
        if !self.revalidate {
            return Some(entry);
        }

        let current = modified_time(key.path());
        if current == entry.modified {
            Some(entry)
        } else {
            tracing::debug!(key = %key, "Cached entry is stale");
            self.cache.remove(key);
            None
        }
    }

    fn failure(&self, error: ServeError, key: Option<CacheKey>) -> Served {
        let status = error.status();
        let header = empty_response(status);

        match status {
            StatusCode::NotFound => {
                tracing::warn!(error = %error, "404 Not Found");
                // Repeat misses for the same bad path skip the filesystem.
                if let Some(key) = key {
                    let entry = CacheEntry::new(header.clone(), Bytes::new())
                        .with_modified(modified_time(key.path()));
                    self.cache.put(key, entry);
                }
            }
            _ => tracing::error!(error = %error, "500 Internal Server Error"),
        }

        Served {
            header,
            body: Bytes::new(),
        }
    }
}

fn build_entry(path: &Path, content_type: &str, gzip: bool) -> Result<CacheEntry, ServeError> {
    let not_found = |source| ServeError::NotFound {
        path: path.to_path_buf(),
        source,
    };

    let mut file = File::open(path).map_err(not_found)?;
    let metadata = file.metadata().map_err(not_found)?;
    if metadata.is_dir() {
        return Err(not_found(io::Error::from(io::ErrorKind::IsADirectory)));
    }

    let mut raw = Vec::with_capacity(metadata.len() as usize);
    file.read_to_end(&mut raw).map_err(not_found)?;

    let body = if gzip {
        gzip_bytes(&raw).map_err(|source| ServeError::Encoding {
            path: path.to_path_buf(),
            source,
        })?
    } else {
        raw
    };

    let modified = metadata.modified().ok();

    let mut builder = ResponseHeaderBuilder::new(StatusCode::Ok)
        .header(CONNECTION, KEEP_ALIVE)
        .header(CONTENT_TYPE, content_type)
        .header(CONTENT_LENGTH, body.len());
    if gzip {
        builder = builder.header(CONTENT_ENCODING, GZIP);
    }
    if let Some(modified) = modified {
        builder = builder.header(LAST_MODIFIED, http_date(modified));
    }

    Ok(CacheEntry::new(builder.build(), Bytes::from(body)).with_modified(modified))
}

fn gzip_bytes(raw: &[u8]) -> io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(raw.len() / 2), Compression::default());
    encoder.write_all(raw)?;
    encoder.finish()
}

/// IMF-fixdate, e.g. `Sun, 06 Nov 1994 08:49:37 GMT`.
pub fn http_date(time: SystemTime) -> String {
    DateTime::<Utc>::from(time)
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}

fn modified_time(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

fn bad_target(target: &str) -> ServeError {
    ServeError::BadTarget(target.to_string())
}
