//! Background refresh of the proxy pool.

use crate::pool::PoolInner;

use log::{info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

/// Periodically merges new addresses into the pool and re-validates it.
///
/// Stops when the pool's cancellation token fires, or closes the pool itself
/// when a refresh leaves no valid address and none on loan.
pub(crate) struct RefreshScheduler {
    inner: Arc<PoolInner>,
    period: Duration,
}

impl RefreshScheduler {
    pub(crate) fn new(inner: Arc<PoolInner>, period: Duration) -> Self {
        // `interval_at` panics on a zero period.
        let period = period.max(Duration::from_millis(1));
        Self { inner, period }
    }

    /// Start the refresh loop. The handle completes once the loop has exited.
    pub(crate) fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(self) {
        info!("Refresh scheduler started, interval {:?}", self.period);
        let cancel = self.inner.cancel.clone();
        let mut ticker = time::interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let outcome = tokio::select! {
                _ = cancel.cancelled() => break,
                outcome = self.inner.scheduled_refresh() => outcome,
            };

            match outcome {
                Ok(stats) if stats.valid == 0 && stats.leased == 0 => {
                    warn!("Refresh left no valid proxies, closing pool");
                    self.inner.mark_closed();
                    break;
                }
                Ok(stats) if stats.valid == 0 => {
                    warn!(
                        "Refresh left no valid proxies, {} still on loan",
                        stats.leased
                    );
                }
                Ok(stats) => {
                    info!(
                        "Proxy pool status update: {}/{} valid proxies",
                        stats.valid, stats.total
                    );
                }
                Err(e) => {
                    warn!("Skipping refresh, failed to fetch proxy addresses: {}", e);
                }
            }
        }

        info!("Refresh scheduler stopped");
    }
}
