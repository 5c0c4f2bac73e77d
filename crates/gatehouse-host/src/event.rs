//! Host lifecycle events, delivered over a `broadcast` channel.

use gatehouse_core::{Direction, Multiaddr, PeerId};

use crate::connection::ConnectionId;
use crate::gater::Checkpoint;

#[derive(Debug, Clone)]
pub enum HostEvent {
    /// A connection passed every checkpoint and was registered.
    ConnectionEstablished {
        peer: PeerId,
        id: ConnectionId,
        direction: Direction,
        remote: Multiaddr,
    },
    /// A registered connection was closed by this host.
    ConnectionClosed { peer: PeerId, id: ConnectionId },
    /// An inbound connection was rejected. `peer` is `None` when the
    /// rejection happened before the handshake.
    InboundDenied {
        checkpoint: Checkpoint,
        remote: Multiaddr,
        peer: Option<PeerId>,
    },
    /// A listener stopped accepting.
    ListenerClosed { addr: Multiaddr },
}
