//! Gate statistics.
//!
//! Counters are plain atomics with `Relaxed` ordering: they are suitable for
//! reporting and assertions after the fact, not for synchronisation.

use gatehouse_core::Direction;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::gater::Checkpoint;

/// Live counters owned by a host.
#[derive(Debug, Default)]
pub struct GateStats {
    peer_dial_denied: AtomicU64,
    addr_dial_denied: AtomicU64,
    accept_denied: AtomicU64,
    secured_denied: AtomicU64,
    upgraded_denied: AtomicU64,
    gater_panics: AtomicU64,
    dial_failures: AtomicU64,
    outbound_established: AtomicU64,
    inbound_established: AtomicU64,
}

impl GateStats {
    pub fn record_denial(&self, checkpoint: Checkpoint) {
        let counter = match checkpoint {
            Checkpoint::PeerDial => &self.peer_dial_denied,
            Checkpoint::AddrDial => &self.addr_dial_denied,
            Checkpoint::Accept => &self.accept_denied,
            Checkpoint::Secured => &self.secured_denied,
            Checkpoint::Upgraded => &self.upgraded_denied,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_gater_panic(&self) {
        self.gater_panics.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dial_failure(&self) {
        self.dial_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_established(&self, direction: Direction) {
        match direction {
            Direction::Outbound => self.outbound_established.fetch_add(1, Ordering::Relaxed),
            Direction::Inbound => self.inbound_established.fetch_add(1, Ordering::Relaxed),
        };
    }

    pub fn snapshot(&self) -> GateStatsSnapshot {
        GateStatsSnapshot {
            peer_dial_denied: self.peer_dial_denied.load(Ordering::Relaxed),
            addr_dial_denied: self.addr_dial_denied.load(Ordering::Relaxed),
            accept_denied: self.accept_denied.load(Ordering::Relaxed),
            secured_denied: self.secured_denied.load(Ordering::Relaxed),
            upgraded_denied: self.upgraded_denied.load(Ordering::Relaxed),
            gater_panics: self.gater_panics.load(Ordering::Relaxed),
            dial_failures: self.dial_failures.load(Ordering::Relaxed),
            outbound_established: self.outbound_established.load(Ordering::Relaxed),
            inbound_established: self.inbound_established.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`GateStats`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GateStatsSnapshot {
    pub peer_dial_denied: u64,
    pub addr_dial_denied: u64,
    pub accept_denied: u64,
    pub secured_denied: u64,
    pub upgraded_denied: u64,
    pub gater_panics: u64,
    pub dial_failures: u64,
    pub outbound_established: u64,
    pub inbound_established: u64,
}

impl GateStatsSnapshot {
    pub fn total_denials(&self) -> u64 {
        self.peer_dial_denied
            + self.addr_dial_denied
            + self.accept_denied
            + self.secured_denied
            + self.upgraded_denied
    }

    /// One-line summary for logs and the CLI.
    pub fn summary(&self) -> String {
        format!(
            "denied: peer-dial {}, addr-dial {}, accept {}, secured {}, upgraded {} | established: {} out, {} in | dial failures {}",
            self.peer_dial_denied,
            self.addr_dial_denied,
            self.accept_denied,
            self.secured_denied,
            self.upgraded_denied,
            self.outbound_established,
            self.inbound_established,
            self.dial_failures,
        )
    }
}
