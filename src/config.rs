//! Configuration for the proxy pool.

use std::time::Duration;

/// User agent sent with requests routed through the pool.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/67.0.3396.62 Safari/537.36";

/// Configuration for the proxy pool.
#[derive(Debug, Clone)]
pub struct ProxyPoolConfig {
    /// Source URLs or file paths to fetch `host:port` lists from.
    pub sources: Vec<String>,
    /// Interval between background refresh cycles.
    pub refresh_interval: Duration,
    /// Timeout for a single reachability probe.
    pub check_timeout: Duration,
    /// Timeout for requests sent through a borrowed proxy.
    pub request_timeout: Duration,
    /// Number of attempts per request through the same proxy.
    pub retry_count: usize,
    /// User agent header sent with proxied requests.
    pub user_agent: String,
    /// Maximum requests per second per proxy.
    pub max_requests_per_second: f64,
}

impl ProxyPoolConfig {
    /// Create a new configuration builder.
    pub fn builder() -> ProxyPoolConfigBuilder {
        ProxyPoolConfigBuilder::new()
    }
}

impl Default for ProxyPoolConfig {
    fn default() -> Self {
        ProxyPoolConfigBuilder::new().build()
    }
}

/// Builder for `ProxyPoolConfig`.
pub struct ProxyPoolConfigBuilder {
    sources: Vec<String>,
    refresh_interval: Option<Duration>,
    check_timeout: Option<Duration>,
    request_timeout: Option<Duration>,
    retry_count: Option<usize>,
    user_agent: Option<String>,
    max_requests_per_second: Option<f64>,
}

impl ProxyPoolConfigBuilder {
    /// Create a new builder with default values.
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
            refresh_interval: None,
            check_timeout: None,
            request_timeout: None,
            retry_count: None,
            user_agent: None,
            max_requests_per_second: None,
        }
    }

    /// Set the source URLs or file paths to fetch proxy lists from.
    pub fn sources(mut self, sources: Vec<impl Into<String>>) -> Self {
        self.sources = sources.into_iter().map(Into::into).collect();
        self
    }

    /// Set the interval between background refresh cycles.
    pub fn refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = Some(interval);
        self
    }

    /// Set the timeout for reachability probes.
    pub fn check_timeout(mut self, timeout: Duration) -> Self {
        self.check_timeout = Some(timeout);
        self
    }

    /// Set the timeout for proxied requests.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Set the number of attempts per request through a borrowed proxy.
    pub fn retry_count(mut self, count: usize) -> Self {
        self.retry_count = Some(count);
        self
    }

    /// Set the user agent header for proxied requests.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Set the maximum requests per second per proxy.
    pub fn max_requests_per_second(mut self, rps: f64) -> Self {
        self.max_requests_per_second = Some(rps);
        self
    }

    /// Build the configuration.
    pub fn build(self) -> ProxyPoolConfig {
        ProxyPoolConfig {
            sources: self.sources,
            refresh_interval: self.refresh_interval.unwrap_or(Duration::from_secs(30 * 60)),
            check_timeout: self.check_timeout.unwrap_or(Duration::from_secs(10)),
            request_timeout: self.request_timeout.unwrap_or(Duration::from_secs(30)),
            retry_count: self.retry_count.unwrap_or(3),
            user_agent: self.user_agent.unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            max_requests_per_second: self.max_requests_per_second.unwrap_or(5.0),
        }
    }
}

impl Default for ProxyPoolConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
