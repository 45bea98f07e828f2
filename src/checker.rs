//! Reachability probes for proxy addresses.

use async_trait::async_trait;
use futures::future;
use log::debug;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time;

/// Decides whether a proxy address is currently reachable.
#[async_trait]
pub trait ValidityChecker: Send + Sync {
    async fn check(&self, addr: &str) -> bool;
}

#[async_trait]
impl<T: ValidityChecker + ?Sized> ValidityChecker for Arc<T> {
    async fn check(&self, addr: &str) -> bool {
        (**self).check(addr).await
    }
}

/// Probes an address with a bounded TCP connect. No data is exchanged.
#[derive(Debug, Clone)]
pub struct TcpChecker {
    timeout: Duration,
}

impl TcpChecker {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Default for TcpChecker {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

#[async_trait]
impl ValidityChecker for TcpChecker {
    async fn check(&self, addr: &str) -> bool {
        match time::timeout(self.timeout, TcpStream::connect(addr)).await {
            // The stream is dropped here, closing the connection.
            Ok(Ok(_stream)) => true,
            Ok(Err(e)) => {
                debug!("Probe of {} failed: {}", addr, e);
                false
            }
            Err(_) => {
                debug!("Probe of {} timed out after {:?}", addr, self.timeout);
                false
            }
        }
    }
}

/// Probe every address concurrently and return the ones that failed.
///
/// Returns only after every probe has finished.
pub async fn check_all<C>(checker: &C, addresses: Vec<String>) -> Vec<String>
where
    C: ValidityChecker + ?Sized,
{
    let probes = addresses.into_iter().map(|addr| async move {
        let reachable = checker.check(&addr).await;
        (addr, reachable)
    });

    future::join_all(probes)
        .await
        .into_iter()
        .filter_map(|(addr, reachable)| if reachable { None } else { Some(addr) })
        .collect()
}
