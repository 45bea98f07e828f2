//! # rotating-proxy-pool
//!
//! A self-refreshing pool of HTTP proxies with exclusive borrow and return.
//!
//! The pool fetches `host:port` addresses from an [`AddressSource`], checks
//! that they accept TCP connections, and lends each reachable address to one
//! caller at a time through [`ProxyPool::pop`] and [`ProxyPool::put`]. A
//! background task refreshes and re-validates the list until the pool is
//! closed. [`ProxyPoolMiddleware`] plugs the pool into `reqwest-middleware`.

pub mod checker;
pub mod config;
pub mod error;
pub mod middleware;
pub mod pool;
pub mod proxy;
mod scheduler;
pub mod source;
pub mod store;
mod utils;

pub use checker::{check_all, TcpChecker, ValidityChecker};
pub use config::{ProxyPoolConfig, ProxyPoolConfigBuilder};
pub use error::{PoolError, SourceError};
pub use middleware::ProxyPoolMiddleware;
pub use pool::ProxyPool;
pub use proxy::ProxyStatus;
pub use source::{AddressSource, ListSource, StaticSource};
pub use store::{PoolStats, PoolStore};
