//! Providers of candidate proxy addresses.

use crate::error::SourceError;
use crate::utils;

use async_trait::async_trait;
use log::{info, warn};
use reqwest::Client;
use std::collections::HashSet;
use std::sync::Arc;

/// Produces a fresh list of candidate `host:port` addresses on demand.
#[async_trait]
pub trait AddressSource: Send + Sync {
    async fn fetch_addresses(&self) -> Result<Vec<String>, SourceError>;
}

#[async_trait]
impl<T: AddressSource + ?Sized> AddressSource for Arc<T> {
    async fn fetch_addresses(&self) -> Result<Vec<String>, SourceError> {
        (**self).fetch_addresses().await
    }
}

/// Fetches plain-text proxy lists from URLs or local files.
pub struct ListSource {
    sources: Vec<String>,
    client: Client,
}

impl ListSource {
    /// Create a source reading from the given URLs or file paths.
    pub fn new(sources: Vec<String>) -> Self {
        Self {
            sources,
            client: Client::new(),
        }
    }

    async fn fetch_one(&self, source: &str) -> Result<Vec<String>, SourceError> {
        let content = if source.starts_with("http://") || source.starts_with("https://") {
            self.client
                .get(source)
                .send()
                .await?
                .error_for_status()?
                .text()
                .await?
        } else {
            tokio::fs::read_to_string(source)
                .await
                .map_err(|source_err| SourceError::Io {
                    path: source.to_string(),
                    source: source_err,
                })?
        };
        Ok(utils::parse_address_list(&content))
    }
}

#[async_trait]
impl AddressSource for ListSource {
    async fn fetch_addresses(&self) -> Result<Vec<String>, SourceError> {
        let mut addresses = Vec::new();
        let mut last_error = None;
        let mut succeeded = false;

        for source in &self.sources {
            match self.fetch_one(source).await {
                Ok(found) => {
                    info!("Fetched {} proxy addresses from {}", found.len(), source);
                    addresses.extend(found);
                    succeeded = true;
                }
                Err(e) => {
                    warn!("Failed to fetch proxy addresses from {}: {}", source, e);
                    last_error = Some(e);
                }
            }
        }

        if !succeeded {
            return Err(last_error.unwrap_or(SourceError::NoSources));
        }

        // Sources may overlap.
        let mut seen = HashSet::new();
        addresses.retain(|addr| seen.insert(addr.clone()));
        Ok(addresses)
    }
}

/// A source that always returns the same list.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    addresses: Vec<String>,
}

impl StaticSource {
    pub fn new(addresses: Vec<impl Into<String>>) -> Self {
        Self {
            addresses: addresses.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl AddressSource for StaticSource {
    async fn fetch_addresses(&self) -> Result<Vec<String>, SourceError> {
        Ok(self.addresses.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    fn temp_list(name: &str, content: &str) -> String {
        let path = std::env::temp_dir().join(format!(
            "rotating-proxy-pool-{}-{}.txt",
            name,
            std::process::id()
        ));
        std::fs::write(&path, content).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[tokio::test]
    async fn reads_and_merges_file_sources() {
        let first = temp_list("first", "1.1.1.1:80\n2.2.2.2:8080\n");
        let second = temp_list("second", "# overlap\n2.2.2.2:8080\n3.3.3.3:3128\n");

        let source = ListSource::new(vec![first.clone(), second.clone()]);
        let addresses = assert_ok!(source.fetch_addresses().await);
        assert_eq!(addresses, vec!["1.1.1.1:80", "2.2.2.2:8080", "3.3.3.3:3128"]);

        std::fs::remove_file(first).ok();
        std::fs::remove_file(second).ok();
    }

    #[tokio::test]
    async fn skips_failing_source_when_another_succeeds() {
        let good = temp_list("good", "4.4.4.4:80\n");
        let source = ListSource::new(vec![
            "/nonexistent/rotating-proxy-pool.txt".to_string(),
            good.clone(),
        ]);
        let addresses = assert_ok!(source.fetch_addresses().await);
        assert_eq!(addresses, vec!["4.4.4.4:80"]);
        std::fs::remove_file(good).ok();
    }

    #[tokio::test]
    async fn fails_when_every_source_fails() {
        let source = ListSource::new(vec!["/nonexistent/rotating-proxy-pool.txt".to_string()]);
        let err = assert_err!(source.fetch_addresses().await);
        assert!(matches!(err, SourceError::Io { .. }));

        let empty = ListSource::new(Vec::new());
        let err = assert_err!(empty.fetch_addresses().await);
        assert!(matches!(err, SourceError::NoSources));
    }

    #[tokio::test]
    async fn static_source_returns_its_list() {
        let source = StaticSource::new(vec!["9.9.9.9:80"]);
        assert_eq!(assert_ok!(source.fetch_addresses().await), vec!["9.9.9.9:80"]);
    }
}
