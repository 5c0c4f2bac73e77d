//! Secured → upgraded → registered.
//!
//! Shared tail of the outbound and inbound pipelines: the secured
//! checkpoint, the upgraded checkpoint (inside the registry), then
//! bookkeeping for the new connection.
//!
//! A dial races several addresses and each of them may finish its handshake
//! with the listener. Only the winner is committed: once the dialer has
//! registered it, the dialer writes a single [`COMMIT`] byte. The listener
//! waits for that byte before running its own secured checkpoint, so the
//! attempts the dialer abandoned never register on the listening side.

use gatehouse_core::{BoxedIo, Direction, GateError, GateResult, SecuredConnection};
use std::io::ErrorKind;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tracing::{debug, info, warn};

use crate::connection::{Connection, ConnectionId};
use crate::event::HostEvent;
use crate::host::Shared;

/// Byte the dialer sends on the connection it keeps.
pub const COMMIT: u8 = 0x01;

pub(crate) async fn finalize(
    shared: &Arc<Shared>,
    secured: SecuredConnection,
    direction: Direction,
) -> GateResult<Arc<Connection>> {
    let peer = secured.peer;
    if !shared.gate.secured(direction, &peer, &secured.addrs) {
        warn!(
            peer = %peer.short(),
            remote = %secured.addrs.remote,
            direction = %direction,
            "secured connection denied by gater"
        );
        let addr = secured.addrs.remote.clone();
        secured.close().await;
        return Err(GateError::SecurityDenied { peer, addr });
    }

    let conn = Connection::new(ConnectionId(shared.next_connection_id()), secured, direction);
    let conn = shared.registry.admit(conn, &shared.gate).await?;

    if direction == Direction::Outbound {
        if let Err(e) = conn.write_preamble(&[COMMIT]).await {
            warn!(peer = %peer.short(), conn = %conn.id(), error = %e, "failed to commit connection");
            shared.registry.remove(&peer, conn.id()).await;
            conn.close().await;
            return Err(e);
        }
    }
    shared.watch_close(&conn);

    shared.gate.stats().record_established(direction);
    info!(
        peer = %peer.short(),
        conn = %conn.id(),
        direction = %direction,
        transport = %conn.transport(),
        remote = %conn.remote_addr(),
        "connection established"
    );
    shared.emit(HostEvent::ConnectionEstablished {
        peer,
        id: conn.id(),
        direction,
        remote: conn.remote_addr().clone(),
    });

    Ok(conn)
}

/// Wait for the dialer to commit an inbound connection.
pub(crate) async fn read_commit(io: &mut BoxedIo) -> GateResult<()> {
    let mut byte = [0u8; 1];
    match io.read_exact(&mut byte).await {
        Ok(_) if byte[0] == COMMIT => Ok(()),
        Ok(_) => Err(GateError::Handshake(format!("unexpected commit byte {:#04x}", byte[0]))),
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
            debug!("dialer dropped the connection before committing");
            Err(GateError::Handshake("connection abandoned by dialer".into()))
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn commit_byte_is_accepted() {
        let (ours, mut theirs) = tokio::io::duplex(16);
        let mut io: BoxedIo = Box::new(ours);
        theirs.write_all(&[COMMIT, b'x']).await.unwrap();
        read_commit(&mut io).await.unwrap();

        // Application bytes after the commit are left in the stream.
        let mut rest = [0u8; 1];
        io.read_exact(&mut rest).await.unwrap();
        assert_eq!(&rest, b"x");
    }

    #[tokio::test]
    async fn abandoned_connection_is_not_committed() {
        let (ours, theirs) = tokio::io::duplex(16);
        let mut io: BoxedIo = Box::new(ours);
        drop(theirs);
        assert!(matches!(read_commit(&mut io).await, Err(GateError::Handshake(_))));
    }

    #[tokio::test]
    async fn wrong_byte_is_rejected() {
        let (ours, mut theirs) = tokio::io::duplex(16);
        let mut io: BoxedIo = Box::new(ours);
        theirs.write_all(&[0x7f]).await.unwrap();
        assert!(matches!(read_commit(&mut io).await, Err(GateError::Handshake(_))));
    }
}
