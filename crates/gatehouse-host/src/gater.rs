//! The connection gater: the policy hook consulted at every stage of the
//! dial/accept pipeline.
//!
//! # Checkpoints
//!
//! | Checkpoint   | Direction | Runs                                   | Deny scope        |
//! |--------------|-----------|----------------------------------------|-------------------|
//! | `PeerDial`   | outbound  | once per dial, before any address      | whole dial        |
//! | `AddrDial`   | outbound  | once per candidate address             | that address      |
//! | `Accept`     | inbound   | after transport accept, pre-handshake  | that connection   |
//! | `Secured`    | both      | after the handshake, pre-upgrade       | whole attempt     |
//! | `Upgraded`   | both      | just before registration               | whole attempt     |
//!
//! Within one attempt the checkpoints always run in table order. Gater
//! methods are synchronous and are called from whichever task reaches the
//! checkpoint, possibly from several tasks at once, so implementations must
//! be `Send + Sync` and should answer quickly: a slow gater stalls the task
//! that called it.

use gatehouse_core::{ConnectedAddrs, Direction, DisconnectReason, Multiaddr, PeerId};
use serde::Serialize;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error};

use crate::connection::Connection;
use crate::stats::GateStats;

/// Named decision points of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Checkpoint {
    PeerDial,
    AddrDial,
    Accept,
    Secured,
    Upgraded,
}

impl Checkpoint {
    pub fn name(&self) -> &'static str {
        match self {
            Checkpoint::PeerDial => "peer-dial",
            Checkpoint::AddrDial => "addr-dial",
            Checkpoint::Accept => "accept",
            Checkpoint::Secured => "secured",
            Checkpoint::Upgraded => "upgraded",
        }
    }
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Verdict of the final (upgraded) checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    allowed: bool,
    reason: Option<DisconnectReason>,
}

impl Decision {
    pub const fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }

    pub const fn deny(reason: Option<DisconnectReason>) -> Self {
        Self {
            allowed: false,
            reason,
        }
    }

    pub fn is_allowed(&self) -> bool {
        self.allowed
    }

    pub fn reason(&self) -> Option<DisconnectReason> {
        self.reason
    }
}

impl From<bool> for Decision {
    fn from(allowed: bool) -> Self {
        Self {
            allowed,
            reason: None,
        }
    }
}

/// Policy hook for connection establishment.
///
/// Every method defaults to "allow", so implementations override only the
/// checkpoints they care about. A `false` (or denying [`Decision`]) is final
/// for the checkpoint's scope. Methods must not block indefinitely; a
/// panicking method is caught and treated as a denial.
pub trait ConnectionGater: Send + Sync {
    /// Before dialing `peer` at all.
    fn intercept_peer_dial(&self, _peer: &PeerId) -> bool {
        true
    }

    /// Before dialing `peer` on one specific address.
    fn intercept_addr_dial(&self, _peer: &PeerId, _addr: &Multiaddr) -> bool {
        true
    }

    /// After an inbound transport connection is accepted, before any handshake.
    fn intercept_accept(&self, _addrs: &ConnectedAddrs) -> bool {
        true
    }

    /// After the security handshake, once the remote identity is known.
    fn intercept_secured(&self, _direction: Direction, _peer: &PeerId, _addrs: &ConnectedAddrs) -> bool {
        true
    }

    /// Before the connection is registered as usable.
    fn intercept_upgraded(&self, _conn: &Connection) -> Decision {
        Decision::allow()
    }
}

/// Gater installed when none is configured: allows everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl ConnectionGater for AllowAll {}

/// The host's handle on its gater: catches panics and counts denials.
pub(crate) struct Gate {
    gater: Arc<dyn ConnectionGater>,
    stats: GateStats,
}

impl Gate {
    pub(crate) fn new(gater: Arc<dyn ConnectionGater>) -> Self {
        Self {
            gater,
            stats: GateStats::default(),
        }
    }

    pub(crate) fn stats(&self) -> &GateStats {
        &self.stats
    }

    pub(crate) fn peer_dial(&self, peer: &PeerId) -> bool {
        self.check(Checkpoint::PeerDial, || self.gater.intercept_peer_dial(peer))
            .is_allowed()
    }

    pub(crate) fn addr_dial(&self, peer: &PeerId, addr: &Multiaddr) -> bool {
        self.check(Checkpoint::AddrDial, || self.gater.intercept_addr_dial(peer, addr))
            .is_allowed()
    }

    pub(crate) fn accept(&self, addrs: &ConnectedAddrs) -> bool {
        self.check(Checkpoint::Accept, || self.gater.intercept_accept(addrs))
            .is_allowed()
    }

    pub(crate) fn secured(&self, direction: Direction, peer: &PeerId, addrs: &ConnectedAddrs) -> bool {
        self.check(Checkpoint::Secured, || {
            self.gater.intercept_secured(direction, peer, addrs)
        })
        .is_allowed()
    }

    pub(crate) fn upgraded(&self, conn: &Connection) -> Decision {
        self.check(Checkpoint::Upgraded, || self.gater.intercept_upgraded(conn))
    }

    fn check<D: Into<Decision>>(&self, checkpoint: Checkpoint, call: impl FnOnce() -> D) -> Decision {
        let outcome: std::thread::Result<Decision> = panic::catch_unwind(AssertUnwindSafe(|| call().into()));
        let decision = match outcome {
            Ok(decision) => decision,
            Err(_) => {
                error!(checkpoint = checkpoint.name(), "connection gater panicked, treating as denial");
                self.stats.record_gater_panic();
                Decision::deny(None)
            }
        };
        if !decision.is_allowed() {
            debug!(checkpoint = checkpoint.name(), reason = ?decision.reason(), "gater denied");
            self.stats.record_denial(checkpoint);
        }
        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct DenyAddrs;

    impl ConnectionGater for DenyAddrs {
        fn intercept_addr_dial(&self, _peer: &PeerId, _addr: &Multiaddr) -> bool {
            false
        }
    }

    struct Panicky;

    impl ConnectionGater for Panicky {
        fn intercept_peer_dial(&self, _peer: &PeerId) -> bool {
            panic!("policy backend unavailable");
        }
    }

    fn addrs() -> ConnectedAddrs {
        ConnectedAddrs {
            local: "/ip4/127.0.0.1/tcp/1".parse().unwrap(),
            remote: "/ip4/127.0.0.1/tcp/2".parse().unwrap(),
        }
    }

    #[test]
    fn allow_all_allows_every_checkpoint() {
        let gate = Gate::new(Arc::new(AllowAll));
        let peer = PeerId::random();
        assert!(gate.peer_dial(&peer));
        assert!(gate.addr_dial(&peer, &addrs().remote));
        assert!(gate.accept(&addrs()));
        assert!(gate.secured(Direction::Inbound, &peer, &addrs()));
        assert_eq!(gate.stats().snapshot().total_denials(), 0);
    }

    #[test]
    fn overridden_checkpoint_denies_and_is_counted() {
        let gate = Gate::new(Arc::new(DenyAddrs));
        let peer = PeerId::random();
        assert!(gate.peer_dial(&peer));
        assert!(!gate.addr_dial(&peer, &addrs().remote));
        assert_eq!(gate.stats().snapshot().addr_dial_denied, 1);
    }

    #[test]
    fn panic_is_a_denial_not_a_crash() {
        let gate = Gate::new(Arc::new(Panicky));
        assert!(!gate.peer_dial(&PeerId::random()));
        let snap = gate.stats().snapshot();
        assert_eq!(snap.peer_dial_denied, 1);
        assert_eq!(snap.gater_panics, 1);
    }

    #[test]
    fn decision_from_bool() {
        assert!(Decision::from(true).is_allowed());
        assert!(!Decision::from(false).is_allowed());
        assert_eq!(
            Decision::deny(Some(DisconnectReason(3))).reason(),
            Some(DisconnectReason(3))
        );
    }
}
