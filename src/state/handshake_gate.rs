//! Handshake freshness cache.
//!
//! Login is only accepted from an address that completed the capability
//! handshake in the last [`HANDSHAKE_TTL_SECS`] seconds. The cache is a
//! fixed table of [`HANDSHAKE_SLOTS`] entries; when it is full the oldest
//! entry is overwritten.

use std::net::IpAddr;
use std::sync::{Arc, Mutex};

use tracing::{debug, trace};

use crate::state::lock;
use crate::utils::time::Clock;

pub const HANDSHAKE_SLOTS: usize = 32;
pub const HANDSHAKE_TTL_SECS: u64 = 30;

#[derive(Debug, Clone, Copy)]
struct GateEntry {
    ip: IpAddr,
    marked_at: u64,
    valid: bool,
}

#[derive(Debug)]
pub struct HandshakeGate {
    slots: Mutex<Vec<Option<GateEntry>>>,
    ttl_secs: u64,
    clock: Arc<dyn Clock>,
}

impl HandshakeGate {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_settings(clock, HANDSHAKE_SLOTS, HANDSHAKE_TTL_SECS)
    }

    pub fn with_settings(clock: Arc<dyn Clock>, slots: usize, ttl_secs: u64) -> Self {
        Self {
            slots: Mutex::new(vec![None; slots.max(1)]),
            ttl_secs,
            clock,
        }
    }

    /// Record a successful handshake from `ip`.
    ///
    /// Reuses the slot already held by `ip`, else the first empty slot, else
    /// the oldest valid slot.
    pub fn mark(&self, ip: IpAddr) {
        let ip = ip.to_canonical();
        let now = self.clock.now_secs();
        let mut slots = lock(&self.slots);

        let slot = slots
            .iter()
            .position(|e| matches!(e, Some(e) if e.valid && e.ip == ip))
            .or_else(|| slots.iter().position(|e| !matches!(e, Some(e) if e.valid)))
            .or_else(|| {
                slots
                    .iter()
                    .enumerate()
                    .filter_map(|(i, e)| e.map(|e| (i, e.marked_at)))
                    .min_by_key(|(_, t)| *t)
                    .map(|(i, _)| i)
            });

        if let Some(i) = slot {
            slots[i] = Some(GateEntry {
                ip,
                marked_at: now,
                valid: true,
            });
            debug!(%ip, slot = i, "Handshake recorded");
        }
    }

    /// Whether `ip` handshook within the TTL. A stale entry is invalidated.
    pub fn has_recent(&self, ip: IpAddr) -> bool {
        let ip = ip.to_canonical();
        let now = self.clock.now_secs();
        let mut slots = lock(&self.slots);

        for entry in slots.iter_mut().flatten() {
            if !entry.valid || entry.ip != ip {
                continue;
            }
            if now.saturating_sub(entry.marked_at) > self.ttl_secs {
                entry.valid = false;
                trace!(%ip, "Handshake entry expired");
                return false;
            }
            return true;
        }
        false
    }

    /// Valid entries currently held.
    pub fn len(&self) -> usize {
        lock(&self.slots)
            .iter()
            .flatten()
            .filter(|e| e.valid)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::time::ManualClock;
    use std::net::{Ipv4Addr, Ipv6Addr};

    fn ip(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, last))
    }

    #[test]
    fn test_mark_and_check() {
        let clock = ManualClock::new(100);
        let gate = HandshakeGate::new(Arc::new(clock.clone()));

        assert!(!gate.has_recent(ip(1)));
        gate.mark(ip(1));
        assert!(gate.has_recent(ip(1)));
        assert!(!gate.has_recent(ip(2)));
    }

    #[test]
    fn test_ttl_boundary() {
        let clock = ManualClock::new(100);
        let gate = HandshakeGate::new(Arc::new(clock.clone()));
        gate.mark(ip(1));

        clock.advance(30);
        assert!(gate.has_recent(ip(1)));
        clock.advance(1);
        assert!(!gate.has_recent(ip(1)));
        // The stale entry was dropped, not just skipped.
        assert!(gate.is_empty());
    }

    #[test]
    fn test_remark_reuses_slot() {
        let clock = ManualClock::new(100);
        let gate = HandshakeGate::new(Arc::new(clock.clone()));
        gate.mark(ip(1));
        clock.advance(20);
        gate.mark(ip(1));
        assert_eq!(gate.len(), 1);
        clock.advance(20);
        assert!(gate.has_recent(ip(1)));
    }

    #[test]
    fn test_full_table_evicts_oldest() {
        let clock = ManualClock::new(100);
        let gate = HandshakeGate::with_settings(Arc::new(clock.clone()), 3, 30);
        for i in 1..=3 {
            gate.mark(ip(i));
            clock.advance(1);
        }
        gate.mark(ip(4));

        assert_eq!(gate.len(), 3);
        assert!(!gate.has_recent(ip(1)));
        assert!(gate.has_recent(ip(2)));
        assert!(gate.has_recent(ip(4)));
    }

    #[test]
    fn test_mapped_ipv6_matches_ipv4() {
        let clock = ManualClock::new(100);
        let gate = HandshakeGate::new(Arc::new(clock));
        gate.mark(IpAddr::V6(Ipv4Addr::new(10, 0, 0, 7).to_ipv6_mapped()));
        assert!(gate.has_recent(ip(7)));
        assert!(!gate.has_recent(IpAddr::V6(Ipv6Addr::LOCALHOST)));
    }
}
