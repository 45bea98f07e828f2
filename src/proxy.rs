//! Proxy address status and conversion helpers.

/// The pool's belief about whether a proxy address is reachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyStatus {
    /// The proxy passed its last probe, or has not been probed yet.
    Valid,
    /// The proxy failed its last probe. It is kept for later revival.
    Invalid,
}

impl ProxyStatus {
    pub fn is_valid(self) -> bool {
        self == ProxyStatus::Valid
    }
}

/// Convert a `host:port` address into a reqwest HTTP proxy.
pub fn to_reqwest_proxy(addr: &str) -> Result<reqwest::Proxy, reqwest::Error> {
    reqwest::Proxy::all(format!("http://{}", addr))
}
