//! Established connections.

use gatehouse_core::{
    BoxedIo, ConnectedAddrs, Direction, GateError, GateResult, Multiaddr, PeerId, SecuredConnection, TransportKind,
};
use serde::Serialize;
use std::fmt;
use std::time::Instant;
use tokio::io::AsyncWriteExt;
use tokio::sync::{watch, Mutex};

/// Host-local connection identifier, unique for the lifetime of a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// A secured connection to a known peer.
///
/// Carries the identity and addresses used to reach the peer. The stream is
/// held until [`close`](Self::close) or [`take_io`](Self::take_io). Closing
/// is observable through [`closed`](Self::closed); the host uses it to drop
/// the connection from its registry however the close was triggered.
pub struct Connection {
    id: ConnectionId,
    peer: PeerId,
    direction: Direction,
    addrs: ConnectedAddrs,
    kind: TransportKind,
    opened_at: Instant,
    io: Mutex<Option<BoxedIo>>,
    closed_tx: watch::Sender<bool>,
}

impl Connection {
    pub(crate) fn new(id: ConnectionId, secured: SecuredConnection, direction: Direction) -> Self {
        let SecuredConnection {
            peer,
            io,
            addrs,
            kind,
        } = secured;
        Self {
            id,
            peer,
            direction,
            addrs,
            kind,
            opened_at: Instant::now(),
            io: Mutex::new(Some(io)),
            closed_tx: watch::channel(false).0,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer(&self) -> PeerId {
        self.peer
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn addrs(&self) -> &ConnectedAddrs {
        &self.addrs
    }

    pub fn local_addr(&self) -> &Multiaddr {
        &self.addrs.local
    }

    pub fn remote_addr(&self) -> &Multiaddr {
        &self.addrs.remote
    }

    pub fn transport(&self) -> TransportKind {
        self.kind
    }

    pub fn age_secs(&self) -> u64 {
        self.opened_at.elapsed().as_secs()
    }

    pub fn is_closed(&self) -> bool {
        *self.closed_tx.borrow()
    }

    /// Close the underlying stream. Idempotent.
    pub async fn close(&self) {
        if self.closed_tx.send_replace(true) {
            return;
        }
        if let Some(mut io) = self.io.lock().await.take() {
            let _ = io.shutdown().await;
        }
    }

    /// Write bytes on the stream ahead of any application data.
    pub(crate) async fn write_preamble(&self, bytes: &[u8]) -> GateResult<()> {
        let mut io = self.io.lock().await;
        let io = io.as_mut().ok_or(GateError::Closed)?;
        io.write_all(bytes).await?;
        io.flush().await?;
        Ok(())
    }

    /// Resolves once the connection has been closed.
    pub async fn closed(&self) {
        let mut rx = self.closed_tx.subscribe();
        // The sender lives in `self`, so this only ends by observing `true`.
        let _ = rx.wait_for(|closed| *closed).await;
    }

    /// Take the secured stream for application use (e.g. to run a
    /// multiplexer over it). Returns `None` if already taken or closed.
    pub async fn take_io(&self) -> Option<BoxedIo> {
        if self.is_closed() {
            return None;
        }
        self.io.lock().await.take()
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("direction", &self.direction)
            .field("addrs", &self.addrs)
            .field("kind", &self.kind)
            .field("closed", &self.is_closed())
            .finish()
    }
}
