//! Core proxy pool implementation.

use crate::checker::{check_all, TcpChecker, ValidityChecker};
use crate::config::ProxyPoolConfig;
use crate::error::{PoolError, SourceError};
use crate::proxy::ProxyStatus;
use crate::scheduler::RefreshScheduler;
use crate::source::{AddressSource, ListSource};
use crate::store::{PoolStats, PoolStore};

use log::{debug, info, warn};
use rand::seq::SliceRandom;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// State shared between the pool handle and its refresh scheduler.
pub(crate) struct PoolInner {
    pub(crate) store: PoolStore,
    source: Box<dyn AddressSource>,
    checker: Box<dyn ValidityChecker>,
    /// Serializes refresh cycles, scheduled or triggered by `pop`.
    refresh_lock: AsyncMutex<()>,
    closed: AtomicBool,
    pub(crate) cancel: CancellationToken,
}

impl PoolInner {
    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Move to the terminal closed state. Returns `true` on the first call.
    pub(crate) fn mark_closed(&self) -> bool {
        self.cancel.cancel();
        !self.closed.swap(true, Ordering::AcqRel)
    }

    /// Fetch from the source and merge new addresses as valid.
    async fn merge_from_source(&self) -> Result<usize, SourceError> {
        let addresses = self.source.fetch_addresses().await?;
        let added = self.store.load(addresses);
        if added > 0 {
            info!("Merged {} new proxy addresses into the pool", added);
        }
        Ok(added)
    }

    /// Re-probe invalid entries for revival, then probe every valid entry.
    async fn revalidate(&self) -> PoolStats {
        let invalid = self.store.invalid_addresses();
        if !invalid.is_empty() {
            let still_dead: HashSet<String> = check_all(self.checker.as_ref(), invalid.clone())
                .await
                .into_iter()
                .collect();
            let revived = invalid
                .iter()
                .filter(|addr| !still_dead.contains(*addr))
                .filter(|addr| self.store.mark_valid(addr))
                .count();
            if revived > 0 {
                info!("Revived {} proxies", revived);
            }
        }

        let failed = check_all(self.checker.as_ref(), self.store.valid_addresses()).await;
        for addr in &failed {
            self.store.mark_invalid(addr);
        }

        let stats = self.store.stats();
        info!(
            "Validity check completed: {} valid, {} invalid, {} leased",
            stats.valid,
            stats.total - stats.valid,
            stats.leased
        );
        stats
    }

    /// One scheduled refresh cycle. A fetch failure skips the whole cycle.
    pub(crate) async fn scheduled_refresh(&self) -> Result<PoolStats, SourceError> {
        let _cycle = self.refresh_lock.lock().await;
        self.merge_from_source().await?;
        Ok(self.revalidate().await)
    }

    /// One refresh cycle on behalf of a caller that found the pool empty.
    /// A fetch failure is logged and the existing entries are still revalidated.
    async fn refresh_for_caller(&self) -> (Option<SourceError>, usize) {
        let _cycle = self.refresh_lock.lock().await;
        let fetch_error = match self.merge_from_source().await {
            Ok(_) => None,
            Err(e) => {
                warn!("Failed to fetch proxy addresses during refresh: {}", e);
                Some(e)
            }
        };
        (fetch_error, self.revalidate().await.valid)
    }

    /// Try to lease a valid address that passes a fresh probe.
    async fn scan(&self) -> Option<String> {
        let mut candidates = self.store.valid_addresses();
        candidates.shuffle(&mut rand::rng());

        for addr in candidates {
            // Another caller may have leased it since the snapshot.
            if !self.store.take(&addr) {
                continue;
            }
            let reachable = {
                let mut pending = PendingLease::new(&self.store, &addr, ProxyStatus::Valid);
                let reachable = self.checker.check(&addr).await;
                pending.disarm();
                reachable
            };
            if reachable {
                return Some(addr);
            }
            info!("Proxy {} failed its pre-lease probe", addr);
            self.store.restore(&addr, ProxyStatus::Invalid);
        }
        None
    }
}

/// Ends a lease with `fallback` if the probe future is dropped midway.
struct PendingLease<'a> {
    store: &'a PoolStore,
    addr: &'a str,
    fallback: ProxyStatus,
    armed: bool,
}

impl<'a> PendingLease<'a> {
    fn new(store: &'a PoolStore, addr: &'a str, fallback: ProxyStatus) -> Self {
        Self {
            store,
            addr,
            fallback,
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for PendingLease<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.store.restore(self.addr, self.fallback);
        }
    }
}

/// A pool of proxy addresses that callers borrow exclusively and return.
///
/// A background task refreshes the pool every `refresh_interval`. The pool
/// closes itself if a refresh leaves no valid address and none on loan, or
/// when [`close`] is called.
///
/// [`close`]: ProxyPool::close
pub struct ProxyPool {
    inner: Arc<PoolInner>,
    /// Configuration for the pool.
    pub config: ProxyPoolConfig,
    scheduler: AsyncMutex<Option<JoinHandle<()>>>,
}

impl ProxyPool {
    /// Create a new proxy pool reading `config.sources` and probing over TCP.
    ///
    /// This fetches and validates the initial list before returning.
    pub async fn new(config: ProxyPoolConfig) -> Result<Arc<Self>, PoolError> {
        let source = ListSource::new(config.sources.clone());
        let checker = TcpChecker::new(config.check_timeout);
        Self::with_parts(config, source, checker).await
    }

    /// Create a new proxy pool with the given address source and checker.
    ///
    /// Fails if the source cannot be fetched, or if no address passes the
    /// first validity check.
    pub async fn with_parts<S, C>(
        config: ProxyPoolConfig,
        source: S,
        checker: C,
    ) -> Result<Arc<Self>, PoolError>
    where
        S: AddressSource + 'static,
        C: ValidityChecker + 'static,
    {
        let inner = Arc::new(PoolInner {
            store: PoolStore::new(),
            source: Box::new(source),
            checker: Box::new(checker),
            refresh_lock: AsyncMutex::new(()),
            closed: AtomicBool::new(false),
            cancel: CancellationToken::new(),
        });

        let addresses = inner.source.fetch_addresses().await?;
        info!("Found {} proxy addresses before validity check", addresses.len());
        inner.store.load(addresses);

        let failed = check_all(inner.checker.as_ref(), inner.store.valid_addresses()).await;
        for addr in &failed {
            inner.store.mark_invalid(addr);
        }

        let stats = inner.store.stats();
        info!("Initial proxy pool status: {}/{} valid proxies", stats.valid, stats.total);
        if stats.valid == 0 {
            return Err(PoolError::EmptyPool);
        }

        let scheduler = RefreshScheduler::new(Arc::clone(&inner), config.refresh_interval).spawn();

        Ok(Arc::new(Self {
            inner,
            config,
            scheduler: AsyncMutex::new(Some(scheduler)),
        }))
    }

    /// Borrow a reachable proxy address.
    ///
    /// The address is removed from the pool until it is returned with
    /// [`put`](ProxyPool::put). If no address is available a single refresh
    /// is run before giving up with [`PoolError::EmptyPool`].
    pub async fn pop(&self) -> Result<String, PoolError> {
        if self.inner.is_closed() {
            return Err(PoolError::PoolClosed);
        }

        if let Some(addr) = self.inner.scan().await {
            debug!("Leased proxy {}", addr);
            return Ok(addr);
        }

        info!("No valid proxy available, refreshing pool");
        let (_, valid) = self.inner.refresh_for_caller().await;
        if self.inner.is_closed() {
            return Err(PoolError::PoolClosed);
        }
        if valid > 0 {
            if let Some(addr) = self.inner.scan().await {
                debug!("Leased proxy {} after refresh", addr);
                return Ok(addr);
            }
        }

        let stats = self.inner.store.stats();
        warn!(
            "No proxy available after refresh. Total: {}, Leased: {}",
            stats.total, stats.leased
        );
        Err(PoolError::EmptyPool)
    }

    /// Return a borrowed proxy address to the pool.
    ///
    /// A reachable address becomes valid again. An address that fails its
    /// probe, or whose last use failed, is kept as invalid for later revival.
    /// Addresses that are not on loan from this pool are ignored.
    pub async fn put(&self, addr: &str, last_use_succeeded: bool) -> Result<(), PoolError> {
        if self.inner.is_closed() {
            return Err(PoolError::PoolClosed);
        }
        if !self.inner.store.is_leased(addr) {
            warn!("Ignoring return of proxy {} which is not on loan", addr);
            return Ok(());
        }

        let reachable = if last_use_succeeded {
            let mut pending = PendingLease::new(&self.inner.store, addr, ProxyStatus::Invalid);
            let reachable = self.inner.checker.check(addr).await;
            pending.disarm();
            reachable
        } else {
            false
        };
        let status = if reachable {
            ProxyStatus::Valid
        } else {
            ProxyStatus::Invalid
        };
        if self.inner.store.restore(addr, status) {
            debug!("Returned proxy {} as {:?}", addr, status);
        }
        Ok(())
    }

    /// Return a borrowed address as invalid without probing it.
    ///
    /// Unlike [`put`](ProxyPool::put) this never waits and works on a closed
    /// pool, so it can run from `Drop`. The next refresh may revive it.
    pub fn release(&self, addr: &str) {
        if self.inner.store.restore(addr, ProxyStatus::Invalid) {
            debug!("Released proxy {} without a probe", addr);
        }
    }

    /// Stop the refresh scheduler, wait for it to finish, and close the pool.
    ///
    /// Every later `pop` or `put` fails with [`PoolError::PoolClosed`].
    /// Calling this again is a no-op.
    pub async fn close(&self) {
        let mut scheduler = self.scheduler.lock().await;
        self.inner.cancel.cancel();
        if let Some(handle) = scheduler.take() {
            if let Err(e) = handle.await {
                warn!("Refresh scheduler terminated abnormally: {}", e);
            }
        }
        if self.inner.mark_closed() {
            info!("Proxy pool closed");
        }
    }

    /// Run a refresh cycle now. Returns the number of valid addresses.
    pub async fn refresh(&self) -> Result<usize, PoolError> {
        if self.inner.is_closed() {
            return Err(PoolError::PoolClosed);
        }
        match self.inner.refresh_for_caller().await {
            (Some(e), _) => Err(PoolError::Fetch(e)),
            (None, valid) => Ok(valid),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// Get statistics about the proxy pool.
    pub fn stats(&self) -> PoolStats {
        self.inner.store.stats()
    }

    /// The current status of an address, or `None` if absent or leased.
    pub fn status(&self, addr: &str) -> Option<ProxyStatus> {
        self.inner.store.status(addr)
    }
}

impl std::fmt::Debug for ProxyPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyPool")
            .field("stats", &self.stats())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Drop for ProxyPool {
    fn drop(&mut self) {
        // The scheduler task holds its own reference to the shared state.
        self.inner.cancel.cancel();
    }
}
