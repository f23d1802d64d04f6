//! Table of advertisers the scanner has heard
//!
//! Devices with rotating private addresses show up under a new handle every
//! few minutes, so idle entries expire. A peer with a link in flight is kept
//! until the link is released.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use nearcast_core::PeerHandle;

/// How long an idle advertiser is remembered after its last report
pub const DEFAULT_PEER_TTL: Duration = Duration::from_secs(60);

/// Table size above which expired entries are swept
pub const DEFAULT_PRUNE_THRESHOLD: usize = 64;

#[derive(Debug, Clone)]
struct TrackedPeer<P> {
    device: P,
    last_seen: Instant,
    linked: bool,
}

#[derive(Debug, Clone)]
pub struct PeerTracker<P> {
    peers: HashMap<PeerHandle, TrackedPeer<P>>,
    ttl: Duration,
    prune_threshold: usize,
}

impl<P: Clone> Default for PeerTracker<P> {
    fn default() -> Self {
        Self::new(DEFAULT_PEER_TTL, DEFAULT_PRUNE_THRESHOLD)
    }
}

impl<P: Clone> PeerTracker<P> {
    pub fn new(ttl: Duration, prune_threshold: usize) -> Self {
        Self {
            peers: HashMap::new(),
            ttl,
            prune_threshold,
        }
    }

    /// Record an advertisement from `peer`
    pub fn observe(&mut self, peer: PeerHandle, device: P, now: Instant) {
        match self.peers.get_mut(&peer) {
            Some(tracked) => {
                tracked.device = device;
                tracked.last_seen = now;
            }
            None => {
                self.peers.insert(
                    peer,
                    TrackedPeer {
                        device,
                        last_seen: now,
                        linked: false,
                    },
                );
            }
        }
        if self.peers.len() > self.prune_threshold {
            self.prune(now);
        }
    }

    /// Drop idle entries not heard from within the ttl
    pub fn prune(&mut self, now: Instant) {
        let ttl = self.ttl;
        self.peers
            .retain(|_, tracked| tracked.linked || now.saturating_duration_since(tracked.last_seen) < ttl);
    }

    pub fn get(&self, peer: &PeerHandle) -> Option<P> {
        self.peers.get(peer).map(|tracked| tracked.device.clone())
    }

    pub fn contains(&self, peer: &PeerHandle) -> bool {
        self.peers.contains_key(peer)
    }

    /// Pin or unpin `peer` while a connection to it is in flight
    pub fn set_linked(&mut self, peer: &PeerHandle, linked: bool) {
        if let Some(tracked) = self.peers.get_mut(peer) {
            tracked.linked = linked;
        }
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn clear(&mut self) {
        self.peers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(n: usize) -> PeerHandle {
        PeerHandle::new(format!("AA:BB:CC:DD:EE:{n:02X}"))
    }

    #[test]
    fn test_rotating_addresses_stay_bounded() {
        let mut tracker = PeerTracker::new(Duration::from_secs(60), 8);
        let start = Instant::now();

        for n in 0..200 {
            tracker.observe(peer(n), n, start + Duration::from_secs(n as u64));
        }

        assert!(tracker.len() <= 61);
        assert!(tracker.contains(&peer(199)));
        assert!(!tracker.contains(&peer(0)));
    }

    #[test]
    fn test_linked_peer_survives_pruning() {
        let mut tracker = PeerTracker::new(Duration::from_secs(1), 0);
        let start = Instant::now();
        tracker.observe(peer(1), "active", start);
        tracker.set_linked(&peer(1), true);

        tracker.observe(peer(2), "other", start + Duration::from_secs(5));
        assert_eq!(tracker.get(&peer(1)), Some("active"));

        tracker.set_linked(&peer(1), false);
        tracker.prune(start + Duration::from_secs(5));
        assert!(!tracker.contains(&peer(1)));
        assert!(tracker.contains(&peer(2)));
    }

    #[test]
    fn test_repeat_report_refreshes_entry() {
        let mut tracker = PeerTracker::new(Duration::from_secs(10), 0);
        let start = Instant::now();
        tracker.observe(peer(1), 1, start);
        tracker.observe(peer(1), 2, start + Duration::from_secs(8));

        tracker.prune(start + Duration::from_secs(15));
        assert_eq!(tracker.get(&peer(1)), Some(2));
        assert_eq!(tracker.len(), 1);
    }
}
