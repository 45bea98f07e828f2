//! Error types for the rotating-proxy-pool crate.

use thiserror::Error;

/// Errors returned by the proxy pool.
#[derive(Debug, Error)]
pub enum PoolError {
    /// The address source could not be reached while building the pool.
    #[error("failed to fetch proxy addresses: {0}")]
    Fetch(#[from] SourceError),
    /// No valid proxy is available, even after a refresh.
    #[error("empty pool")]
    EmptyPool,
    /// The pool has been shut down.
    #[error("proxy pool has closed")]
    PoolClosed,
}

/// Errors returned by an address source.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Fetching a remote list failed.
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    /// Reading a local list failed.
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// No sources were configured.
    #[error("no proxy sources configured")]
    NoSources,
}
