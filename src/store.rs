//! Lock-guarded storage of proxy addresses and their validity.

use crate::proxy::ProxyStatus;

use log::info;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};

/// Counts describing the current pool contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStats {
    /// Addresses held by the pool, valid or not. Leased addresses excluded.
    pub total: usize,
    /// Addresses currently believed reachable.
    pub valid: usize,
    /// Addresses on loan to callers.
    pub leased: usize,
}

#[derive(Default)]
struct StoreState {
    entries: HashMap<String, ProxyStatus>,
    leased: HashSet<String>,
}

/// The set of known proxy addresses.
///
/// Every operation takes the same lock for its whole duration, so callers
/// never observe a partially updated pool. An address on loan is absent from
/// the entries and recorded as leased until it is restored.
#[derive(Default)]
pub struct PoolStore {
    state: Mutex<StoreState>,
}

impl PoolStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert absent addresses as valid. Returns how many were added.
    ///
    /// Existing entries keep their status, and leased addresses are skipped.
    pub fn load<I, S>(&self, addresses: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut state = self.state.lock();
        let mut added = 0;
        for addr in addresses {
            let addr = addr.into();
            if state.leased.contains(&addr) || state.entries.contains_key(&addr) {
                continue;
            }
            state.entries.insert(addr, ProxyStatus::Valid);
            added += 1;
        }
        added
    }

    /// Mark an existing entry invalid. Returns `false` if the address is absent.
    pub fn mark_invalid(&self, addr: &str) -> bool {
        self.set_status(addr, ProxyStatus::Invalid)
    }

    /// Mark an existing entry valid. Returns `false` if the address is absent.
    pub fn mark_valid(&self, addr: &str) -> bool {
        self.set_status(addr, ProxyStatus::Valid)
    }

    fn set_status(&self, addr: &str, status: ProxyStatus) -> bool {
        let mut state = self.state.lock();
        match state.entries.get_mut(addr) {
            Some(current) => {
                if *current != status {
                    info!("Proxy {} status changed: {:?} -> {:?}", addr, current, status);
                    *current = status;
                }
                true
            }
            None => false,
        }
    }

    /// Remove a valid entry and lease it out.
    ///
    /// Returns `false` if the address is absent or invalid.
    pub fn take(&self, addr: &str) -> bool {
        let mut state = self.state.lock();
        match state.entries.get(addr) {
            Some(status) if status.is_valid() => {
                state.entries.remove(addr);
                state.leased.insert(addr.to_string());
                true
            }
            _ => false,
        }
    }

    /// End the lease on `addr` and store it with the given status.
    ///
    /// Returns `false`, leaving the store untouched, if `addr` is not leased.
    pub fn restore(&self, addr: &str, status: ProxyStatus) -> bool {
        let mut state = self.state.lock();
        if !state.leased.remove(addr) {
            return false;
        }
        state.entries.insert(addr.to_string(), status);
        true
    }

    pub fn count_valid(&self) -> usize {
        self.state
            .lock()
            .entries
            .values()
            .filter(|status| status.is_valid())
            .count()
    }

    pub fn status(&self, addr: &str) -> Option<ProxyStatus> {
        self.state.lock().entries.get(addr).copied()
    }

    pub fn is_leased(&self, addr: &str) -> bool {
        self.state.lock().leased.contains(addr)
    }

    pub fn valid_addresses(&self) -> Vec<String> {
        self.addresses_with(ProxyStatus::Valid)
    }

    pub fn invalid_addresses(&self) -> Vec<String> {
        self.addresses_with(ProxyStatus::Invalid)
    }

    fn addresses_with(&self, wanted: ProxyStatus) -> Vec<String> {
        self.state
            .lock()
            .entries
            .iter()
            .filter(|(_, status)| **status == wanted)
            .map(|(addr, _)| addr.clone())
            .collect()
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.state.lock();
        PoolStats {
            total: state.entries.len(),
            valid: state.entries.values().filter(|s| s.is_valid()).count(),
            leased: state.leased.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn load_is_idempotent_and_never_downgrades() {
        let store = PoolStore::new();
        assert_eq!(store.load(["1.2.3.4:8080", "5.6.7.8:3128"]), 2);
        store.mark_invalid("5.6.7.8:3128");

        assert_eq!(store.load(["1.2.3.4:8080", "5.6.7.8:3128", "9.9.9.9:80"]), 1);
        let stats = store.stats();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.valid, 2);
        assert_eq!(store.status("1.2.3.4:8080"), Some(ProxyStatus::Valid));
        // Merging does not revive an invalid entry either.
        assert_eq!(store.status("5.6.7.8:3128"), Some(ProxyStatus::Invalid));
    }

    #[test]
    fn marking_absent_address_is_a_no_op() {
        let store = PoolStore::new();
        assert!(!store.mark_invalid("1.1.1.1:80"));
        assert!(!store.mark_valid("1.1.1.1:80"));
        assert_eq!(store.stats(), PoolStats::default());
    }

    #[test]
    fn take_only_returns_valid_entries() {
        let store = PoolStore::new();
        store.load(["1.2.3.4:8080", "5.6.7.8:3128"]);
        store.mark_invalid("5.6.7.8:3128");

        assert!(!store.take("5.6.7.8:3128"));
        assert!(!store.take("0.0.0.0:1"));
        assert!(store.take("1.2.3.4:8080"));
        assert!(!store.take("1.2.3.4:8080"));

        assert!(store.is_leased("1.2.3.4:8080"));
        assert_eq!(store.status("1.2.3.4:8080"), None);
        assert_eq!(store.count_valid(), 0);
    }

    #[test]
    fn leased_address_is_not_reloaded() {
        let store = PoolStore::new();
        store.load(["1.2.3.4:8080"]);
        assert!(store.take("1.2.3.4:8080"));

        assert_eq!(store.load(["1.2.3.4:8080"]), 0);
        assert_eq!(store.count_valid(), 0);

        assert!(store.restore("1.2.3.4:8080", ProxyStatus::Valid));
        assert!(!store.is_leased("1.2.3.4:8080"));
        assert_eq!(store.count_valid(), 1);
    }

    #[test]
    fn restore_as_invalid_keeps_entry() {
        let store = PoolStore::new();
        store.load(["1.2.3.4:8080"]);
        assert!(store.take("1.2.3.4:8080"));
        assert!(store.restore("1.2.3.4:8080", ProxyStatus::Invalid));

        assert_eq!(store.invalid_addresses(), vec!["1.2.3.4:8080".to_string()]);
        assert!(store.valid_addresses().is_empty());
        assert!(store.mark_valid("1.2.3.4:8080"));
        assert_eq!(store.count_valid(), 1);
    }

    #[test]
    fn restore_requires_a_lease() {
        let store = PoolStore::new();
        store.load(["1.2.3.4:8080"]);

        // Not leased: a stray return must not overwrite or add entries.
        assert!(!store.restore("1.2.3.4:8080", ProxyStatus::Invalid));
        assert!(!store.restore("9.9.9.9:80", ProxyStatus::Valid));
        assert_eq!(store.status("1.2.3.4:8080"), Some(ProxyStatus::Valid));
        assert_eq!(store.status("9.9.9.9:80"), None);

        assert!(store.take("1.2.3.4:8080"));
        assert!(store.restore("1.2.3.4:8080", ProxyStatus::Invalid));
        // A second return of the same lease is ignored.
        assert!(!store.restore("1.2.3.4:8080", ProxyStatus::Valid));
        assert_eq!(store.status("1.2.3.4:8080"), Some(ProxyStatus::Invalid));
    }

    #[test]
    fn concurrent_takes_are_exclusive() {
        let store = Arc::new(PoolStore::new());
        store.load(["1.2.3.4:8080"]);

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || store.take("1.2.3.4:8080"))
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|taken| *taken)
            .count();
        assert_eq!(winners, 1);
    }
}
