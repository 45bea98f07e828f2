//! Middleware implementation for reqwest.

use crate::config::ProxyPoolConfig;
use crate::error::PoolError;
use crate::pool::ProxyPool;
use crate::proxy;

use anyhow::anyhow;
use async_trait::async_trait;
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use log::{debug, info, warn};
use reqwest_middleware::{Error, Middleware, Next, Result};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Middleware that sends each request through a proxy borrowed from the pool.
///
/// The proxy is held for the whole request, including retries, and is
/// returned to the pool afterwards.
#[derive(Clone)]
pub struct ProxyPoolMiddleware {
    /// The proxy pool.
    pool: Arc<ProxyPool>,
    /// Per-proxy request rate limiter.
    limiter: Arc<DefaultKeyedRateLimiter<String>>,
}

impl ProxyPoolMiddleware {
    /// Create a new proxy pool middleware with the given configuration.
    /// This will fetch the proxy list and validate it before returning.
    pub async fn new(config: ProxyPoolConfig) -> std::result::Result<Self, PoolError> {
        let pool = ProxyPool::new(config).await?;
        let stats = pool.stats();
        info!("Proxy pool initialized with {}/{} valid proxies", stats.valid, stats.total);
        Ok(Self::with_pool(pool))
    }

    /// Wrap an existing pool.
    pub fn with_pool(pool: Arc<ProxyPool>) -> Self {
        let rps = pool.config.max_requests_per_second.ceil() as u32;
        let quota = Quota::per_second(NonZeroU32::new(rps).unwrap_or(NonZeroU32::MIN));
        Self {
            pool,
            limiter: Arc::new(RateLimiter::keyed(quota)),
        }
    }

    pub fn pool(&self) -> &Arc<ProxyPool> {
        &self.pool
    }

    async fn give_back(&self, mut lease: BorrowedProxy, succeeded: bool) {
        // `put` guards its own probe from here on.
        lease.returned = true;
        if let Err(e) = self.pool.put(&lease.addr, succeeded).await {
            debug!("Could not return proxy {} to the pool: {}", lease.addr, e);
        }
        // Drop limiter state of proxies that have gone quiet.
        self.limiter.retain_recent();
    }

    fn build_client(&self, addr: &str) -> reqwest::Result<reqwest::Client> {
        let config = &self.pool.config;
        reqwest::Client::builder()
            .proxy(proxy::to_reqwest_proxy(addr)?)
            .user_agent(config.user_agent.as_str())
            .timeout(config.request_timeout)
            .build()
    }
}

/// A proxy on loan for one request.
///
/// Released to the pool as invalid if the request future is dropped before
/// the proxy is given back.
struct BorrowedProxy {
    pool: Arc<ProxyPool>,
    addr: String,
    returned: bool,
}

impl Drop for BorrowedProxy {
    fn drop(&mut self) {
        if !self.returned {
            self.pool.release(&self.addr);
        }
    }
}

#[async_trait]
impl Middleware for ProxyPoolMiddleware {
    async fn handle(
        &self,
        req: reqwest::Request,
        _extensions: &mut http::Extensions,
        _next: Next<'_>,
    ) -> Result<reqwest::Response> {
        if req.try_clone().is_none() {
            return Err(Error::Middleware(anyhow!(
                "Request object is not cloneable. Are you passing a streaming body?"
            )));
        }

        let proxy_addr = self
            .pool
            .pop()
            .await
            .map_err(|e| Error::Middleware(anyhow!(e)))?;
        let lease = BorrowedProxy {
            pool: Arc::clone(&self.pool),
            addr: proxy_addr.clone(),
            returned: false,
        };

        let client = match self.build_client(&proxy_addr) {
            Ok(c) => c,
            Err(e) => {
                warn!("Failed to build client with proxy {}: {}", proxy_addr, e);
                self.give_back(lease, false).await;
                return Err(Error::Reqwest(e));
            }
        };

        let max_attempts = self.pool.config.retry_count.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let proxied_request = req.try_clone().ok_or_else(|| {
                Error::Middleware(anyhow!("Request object is not cloneable"))
            })?;

            self.limiter.until_key_ready(&proxy_addr).await;
            info!("Using proxy: {} (attempt {})", proxy_addr, attempt);

            match client.execute(proxied_request).await {
                Ok(response) => {
                    self.give_back(lease, true).await;
                    return Ok(response);
                }
                Err(err) if attempt < max_attempts => {
                    warn!(
                        "Request failed with proxy {} (attempt {}): {}",
                        proxy_addr, attempt, err
                    );
                }
                Err(err) => {
                    warn!(
                        "Request failed with proxy {} after {} attempts: {}",
                        proxy_addr, attempt, err
                    );
                    self.give_back(lease, false).await;
                    return Err(Error::Reqwest(err));
                }
            }
        }
    }
}
