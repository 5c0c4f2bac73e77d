//! A configurable gater that records every call made to it.
//!
//! Useful for asserting which checkpoints ran, in what order, and with
//! what arguments. All denials are set up front with the builder methods.

use gatehouse_core::{ConnectedAddrs, Direction, DisconnectReason, Multiaddr, PeerId};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::connection::{Connection, ConnectionId};
use crate::gater::{Checkpoint, ConnectionGater, Decision};

/// One observed gater invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GaterCall {
    PeerDial(PeerId),
    AddrDial(PeerId, Multiaddr),
    Accept(ConnectedAddrs),
    Secured(Direction, PeerId, ConnectedAddrs),
    Upgraded(PeerId, ConnectionId),
}

impl GaterCall {
    pub fn checkpoint(&self) -> Checkpoint {
        match self {
            GaterCall::PeerDial(_) => Checkpoint::PeerDial,
            GaterCall::AddrDial(..) => Checkpoint::AddrDial,
            GaterCall::Accept(_) => Checkpoint::Accept,
            GaterCall::Secured(..) => Checkpoint::Secured,
            GaterCall::Upgraded(..) => Checkpoint::Upgraded,
        }
    }
}

type AddrFilter = Box<dyn Fn(&PeerId, &Multiaddr) -> bool + Send + Sync>;

#[derive(Default)]
pub struct RecordingGater {
    calls: Mutex<Vec<GaterCall>>,
    deny_peer_dial: bool,
    addr_filter: Option<AddrFilter>,
    deny_accept: bool,
    deny_secured: bool,
    deny_upgraded: Option<Option<DisconnectReason>>,
    panic_at: Option<Checkpoint>,
}

impl RecordingGater {
    /// A gater that allows everything and only records.
    pub fn allow_all() -> Self {
        Self::default()
    }

    pub fn deny_peer_dial(mut self) -> Self {
        self.deny_peer_dial = true;
        self
    }

    pub fn deny_addr_dial(self) -> Self {
        self.addr_dial_with(|_, _| false)
    }

    /// Decide each address with `filter`; `true` allows.
    pub fn addr_dial_with<F>(mut self, filter: F) -> Self
    where
        F: Fn(&PeerId, &Multiaddr) -> bool + Send + Sync + 'static,
    {
        self.addr_filter = Some(Box::new(filter));
        self
    }

    pub fn deny_accept(mut self) -> Self {
        self.deny_accept = true;
        self
    }

    pub fn deny_secured(mut self) -> Self {
        self.deny_secured = true;
        self
    }

    pub fn deny_upgraded(mut self, reason: Option<DisconnectReason>) -> Self {
        self.deny_upgraded = Some(reason);
        self
    }

    /// Panic (after recording) whenever `checkpoint` is reached.
    pub fn panic_at(mut self, checkpoint: Checkpoint) -> Self {
        self.panic_at = Some(checkpoint);
        self
    }

    pub fn calls(&self) -> Vec<GaterCall> {
        self.lock().clone()
    }

    pub fn checkpoints(&self) -> Vec<Checkpoint> {
        self.lock().iter().map(GaterCall::checkpoint).collect()
    }

    pub fn count(&self, checkpoint: Checkpoint) -> usize {
        self.lock().iter().filter(|c| c.checkpoint() == checkpoint).count()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, Vec<GaterCall>> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, call: GaterCall) {
        let checkpoint = call.checkpoint();
        self.lock().push(call);
        if self.panic_at == Some(checkpoint) {
            panic!("recording gater told to panic at {checkpoint}");
        }
    }
}

impl ConnectionGater for RecordingGater {
    fn intercept_peer_dial(&self, peer: &PeerId) -> bool {
        self.record(GaterCall::PeerDial(*peer));
        !self.deny_peer_dial
    }

    fn intercept_addr_dial(&self, peer: &PeerId, addr: &Multiaddr) -> bool {
        self.record(GaterCall::AddrDial(*peer, addr.clone()));
        self.addr_filter.as_ref().map_or(true, |allow| allow(peer, addr))
    }

    fn intercept_accept(&self, addrs: &ConnectedAddrs) -> bool {
        self.record(GaterCall::Accept(addrs.clone()));
        !self.deny_accept
    }

    fn intercept_secured(&self, direction: Direction, peer: &PeerId, addrs: &ConnectedAddrs) -> bool {
        self.record(GaterCall::Secured(direction, *peer, addrs.clone()));
        !self.deny_secured
    }

    fn intercept_upgraded(&self, conn: &Connection) -> Decision {
        self.record(GaterCall::Upgraded(conn.peer(), conn.id()));
        match self.deny_upgraded {
            Some(reason) => Decision::deny(reason),
            None => Decision::allow(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::tests::test_connection;

    fn addr(s: &str) -> Multiaddr {
        s.parse().unwrap()
    }

    #[test]
    fn records_calls_in_order() {
        let gater = RecordingGater::allow_all();
        let peer = PeerId::random();
        assert!(gater.intercept_peer_dial(&peer));
        assert!(gater.intercept_addr_dial(&peer, &addr("/ip4/10.0.0.1/tcp/4001")));
        assert_eq!(gater.checkpoints(), vec![Checkpoint::PeerDial, Checkpoint::AddrDial]);
        assert_eq!(
            gater.calls()[1],
            GaterCall::AddrDial(peer, addr("/ip4/10.0.0.1/tcp/4001"))
        );

        gater.clear();
        assert!(gater.calls().is_empty());
    }

    #[test]
    fn addr_filter_decides_per_address() {
        let gater = RecordingGater::allow_all().addr_dial_with(|_, a| a.to_string().contains("/tcp/"));
        let peer = PeerId::random();
        assert!(gater.intercept_addr_dial(&peer, &addr("/ip4/10.0.0.1/tcp/4001")));
        assert!(!gater.intercept_addr_dial(&peer, &addr("/ip4/10.0.0.1/udp/4001/quic-v1")));
        assert_eq!(gater.count(Checkpoint::AddrDial), 2);
    }

    #[tokio::test]
    async fn upgraded_denial_carries_reason() {
        let gater = RecordingGater::allow_all().deny_upgraded(Some(DisconnectReason(7)));
        let (conn, _remote) = test_connection(9, PeerId::random());
        let decision = gater.intercept_upgraded(&conn);
        assert!(!decision.is_allowed());
        assert_eq!(decision.reason(), Some(DisconnectReason(7)));
        assert_eq!(gater.calls(), vec![GaterCall::Upgraded(conn.peer(), ConnectionId(9))]);
    }

    #[test]
    fn panic_is_recorded_first() {
        let gater = RecordingGater::allow_all().panic_at(Checkpoint::Accept);
        let addrs = ConnectedAddrs {
            local: addr("/ip4/127.0.0.1/tcp/1"),
            remote: addr("/ip4/127.0.0.1/tcp/2"),
        };
        let caught = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| gater.intercept_accept(&addrs)));
        assert!(caught.is_err());
        assert_eq!(gater.count(Checkpoint::Accept), 1);
    }
}
