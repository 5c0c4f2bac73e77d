//! Transport selection by address.
//!
//! A [`TransportSet`] maps each [`TransportKind`] to the transport that
//! serves it; candidate addresses are routed by their detected kind, so every
//! transport feeds the same dial orchestrator and accept interceptor.

pub mod memory;

pub use memory::{MemoryNetwork, MemoryTransport};

use gatehouse_core::{GateError, GateResult, Multiaddr, Transport, TransportKind};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Registered transports, keyed by the kinds they serve.
#[derive(Clone, Default)]
pub struct TransportSet {
    by_kind: BTreeMap<TransportKind, Arc<dyn Transport>>,
}

impl TransportSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a transport for every kind it reports. Later registrations
    /// replace earlier ones for the same kind.
    pub fn add(&mut self, transport: Arc<dyn Transport>) {
        for kind in transport.kinds() {
            self.by_kind.insert(*kind, transport.clone());
        }
    }

    /// The transport able to dial `addr`, if any.
    pub fn for_addr(&self, addr: &Multiaddr) -> Option<Arc<dyn Transport>> {
        TransportKind::detect(addr).and_then(|kind| self.by_kind.get(&kind).cloned())
    }

    /// Like [`for_addr`](Self::for_addr), as an error for the listen path.
    pub fn require(&self, addr: &Multiaddr) -> GateResult<Arc<dyn Transport>> {
        self.for_addr(addr)
            .ok_or_else(|| GateError::UnsupportedTransport(addr.clone()))
    }

    pub fn kinds(&self) -> Vec<TransportKind> {
        self.by_kind.keys().copied().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.by_kind.is_empty()
    }
}
