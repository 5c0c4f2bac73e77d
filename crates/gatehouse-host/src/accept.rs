//! Inbound connection interception.
//!
//! Each listener runs an accept loop; every accepted raw connection is
//! handled in its own task so that a slow handshake or gater never holds up
//! the loop. Checkpoints, in order: accept (pre-handshake), secured,
//! upgraded. Between the handshake and the secured checkpoint the dialer
//! must commit the connection.

use gatehouse_core::{Direction, GateError, GateResult, Listener, Multiaddr, PeerId, RawConnection};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::time;
use tracing::{debug, info, warn};

use crate::connection::Connection;
use crate::event::HostEvent;
use crate::gater::Checkpoint;
use crate::host::Shared;
use crate::upgrade;

/// Accept loop for one listener. Ends on cancel, host shutdown, or when
/// the listener stops producing connections.
pub(crate) async fn accept_loop(
    shared: Arc<Shared>,
    mut listener: Box<dyn Listener>,
    mut cancel_rx: mpsc::Receiver<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let local = listener.local_addr().clone();

    loop {
        tokio::select! {
            _ = cancel_rx.recv() => {
                debug!(addr = %local, "accept loop cancelled");
                break;
            }
            _ = shutdown_rx.recv() => {
                debug!(addr = %local, "accept loop stopped by shutdown");
                break;
            }
            result = listener.accept() => {
                match result {
                    Ok(raw) => {
                        let shared = shared.clone();
                        tokio::spawn(async move {
                            let remote = raw.addrs.remote.clone();
                            if let Err(e) = handle_inbound(&shared, raw).await {
                                debug!(remote = %remote, error = %e, "inbound connection not established");
                            }
                        });
                    }
                    Err(GateError::Closed) => {
                        debug!(addr = %local, "listener closed");
                        break;
                    }
                    Err(e) => {
                        warn!(addr = %local, error = %e, "accept failed");
                    }
                }
            }
        }
    }

    // Unbind before announcing, so the address is free once observers hear of it.
    drop(listener);
    info!(addr = %local, "listener stopped");
    shared.emit(HostEvent::ListenerClosed { addr: local });
}

/// Run one inbound connection through the gating pipeline.
pub(crate) async fn handle_inbound(shared: &Arc<Shared>, raw: RawConnection) -> GateResult<Arc<Connection>> {
    let remote = raw.addrs.remote.clone();

    if !shared.gate.accept(&raw.addrs) {
        warn!(remote = %remote, local = %raw.addrs.local, "inbound connection denied before handshake");
        raw.close().await;
        notify_denied(shared, Checkpoint::Accept, &remote, None);
        return Err(GateError::AcceptDenied { remote });
    }

    let mut secured = time::timeout(shared.config.handshake_timeout, shared.security.secure_inbound(raw))
        .await
        .map_err(|_| GateError::Timeout)??;
    let peer = secured.peer;

    // Only the dialer's chosen attempt is committed; losers of its race
    // are dropped here.
    time::timeout(shared.config.handshake_timeout, upgrade::read_commit(&mut secured.io))
        .await
        .map_err(|_| GateError::Timeout)??;

    let result = upgrade::finalize(shared, secured, Direction::Inbound).await;
    match &result {
        Err(GateError::SecurityDenied { .. }) => {
            notify_denied(shared, Checkpoint::Secured, &remote, Some(peer))
        }
        Err(GateError::UpgradeDenied { .. }) => {
            notify_denied(shared, Checkpoint::Upgraded, &remote, Some(peer))
        }
        _ => {}
    }
    result
}

fn notify_denied(shared: &Shared, checkpoint: Checkpoint, remote: &Multiaddr, peer: Option<PeerId>) {
    shared.emit(HostEvent::InboundDenied {
        checkpoint,
        remote: remote.clone(),
        peer,
    });
}
