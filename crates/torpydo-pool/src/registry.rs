//! Live-node registry.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use torpydo_core::NodeEndpoint;

use crate::wire;

/// Registry of live nodes keyed by endpoint.
///
/// The only state shared across tasks in the index; everything is guarded
/// by one mutex. Alongside the map it keeps the wire encoding of the
/// current listing, rebuilt on membership change, so a list request is a
/// single buffer write.
pub struct Registry {
    inner: Mutex<Inner>,
}

struct Inner {
    nodes: HashMap<NodeEndpoint, Instant>,
    listing: Vec<u8>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                nodes: HashMap::new(),
                listing: Vec::new(),
            }),
        }
    }

    /// Record a heartbeat from `endpoint` at `now`. Returns `true` when the
    /// node was not present before.
    pub fn heartbeat(&self, endpoint: NodeEndpoint, now: Instant) -> bool {
        let mut inner = self.inner.lock();
        let added = inner.nodes.insert(endpoint, now).is_none();
        if added {
            inner.rebuild_listing();
        }
        added
    }

    /// Drop every entry whose last heartbeat is older than `deprecation`.
    /// Returns the evicted endpoints.
    pub fn sweep(&self, now: Instant, deprecation: Duration) -> Vec<NodeEndpoint> {
        let mut inner = self.inner.lock();
        let mut evicted = Vec::new();
        inner.nodes.retain(|endpoint, last_seen| {
            let live = now.duration_since(*last_seen) <= deprecation;
            if !live {
                evicted.push(endpoint.clone());
            }
            live
        });
        if !evicted.is_empty() {
            inner.rebuild_listing();
        }
        evicted
    }

    /// Wire encoding of the current listing.
    pub fn listing(&self) -> Vec<u8> {
        self.inner.lock().listing.clone()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.inner.lock().nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `endpoint` is currently listed.
    pub fn contains(&self, endpoint: &NodeEndpoint) -> bool {
        self.inner.lock().nodes.contains_key(endpoint)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Inner {
    fn rebuild_listing(&mut self) {
        self.listing = wire::encode_listing(self.nodes.keys());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heartbeat_registers_once() {
        let registry = Registry::new();
        let endpoint = NodeEndpoint::new("127.0.2.1", 6001);
        let now = Instant::now();

        assert!(registry.heartbeat(endpoint.clone(), now));
        assert!(!registry.heartbeat(endpoint.clone(), now));
        assert_eq!(registry.len(), 1);
        assert!(registry.contains(&endpoint));
    }

    #[test]
    fn sweep_evicts_only_stale_entries() {
        let registry = Registry::new();
        let stale = NodeEndpoint::new("stale", 1);
        let fresh = NodeEndpoint::new("fresh", 2);
        let start = Instant::now();

        registry.heartbeat(stale.clone(), start);
        registry.heartbeat(fresh.clone(), start + Duration::from_secs(5));

        let evicted = registry.sweep(start + Duration::from_secs(6), Duration::from_secs(3));
        assert_eq!(evicted, vec![stale.clone()]);
        assert!(!registry.contains(&stale));
        assert!(registry.contains(&fresh));
    }

    #[test]
    fn a_fresh_heartbeat_survives_the_sweep() {
        let registry = Registry::new();
        let endpoint = NodeEndpoint::new("node", 1);
        let start = Instant::now();

        registry.heartbeat(endpoint.clone(), start);
        registry.heartbeat(endpoint.clone(), start + Duration::from_secs(4));
        let evicted = registry.sweep(start + Duration::from_secs(6), Duration::from_secs(3));
        assert!(evicted.is_empty());
        assert!(registry.contains(&endpoint));
    }

    #[test]
    fn listing_tracks_membership() {
        let registry = Registry::new();
        assert!(registry.listing().is_empty());

        let endpoint = NodeEndpoint::new("127.0.2.1", 6001);
        let now = Instant::now();
        registry.heartbeat(endpoint.clone(), now);
        let listed = wire::parse_listing(&registry.listing()).unwrap();
        assert_eq!(listed, vec![endpoint.clone()]);

        registry.sweep(now + Duration::from_secs(10), Duration::from_secs(1));
        assert!(registry.listing().is_empty());
    }

    #[test]
    fn refreshing_a_known_node_keeps_the_listing_stable() {
        let registry = Registry::new();
        let endpoint = NodeEndpoint::new("127.0.2.1", 6001);
        let now = Instant::now();

        registry.heartbeat(endpoint.clone(), now);
        let before = registry.listing();
        registry.heartbeat(endpoint, now + Duration::from_secs(1));
        assert_eq!(registry.listing(), before);
    }
}
