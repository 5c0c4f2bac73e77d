//! Outbound dial orchestration.
//!
//! ```text
//! dial(peer, addrs)
//!   → intercept_peer_dial            deny → GaterDisallowedConnection
//!   → reuse an open connection, if any
//!   → intercept_addr_dial per addr   all denied → NoGoodAddresses
//!   → race transport dial + handshake on the survivors (JoinSet)
//!       first handshake to finish wins, the rest are aborted
//!   → intercept_secured              deny → SecurityDenied
//!   → intercept_upgraded             deny → UpgradeDenied
//!   → registry
//! ```

use gatehouse_core::{
    Direction, GateError, GateResult, Multiaddr, PeerId, SecuredConnection, SecurityUpgrade, Transport,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};

use crate::connection::Connection;
use crate::host::Shared;
use crate::upgrade;

/// Dial `peer`, giving up at `deadline`.
pub(crate) async fn dial_peer(
    shared: &Arc<Shared>,
    peer: PeerId,
    addrs: Vec<Multiaddr>,
    deadline: Instant,
) -> GateResult<Arc<Connection>> {
    if shared.is_closed() {
        return Err(GateError::Closed);
    }
    if peer == shared.local_peer {
        return Err(GateError::DialSelf);
    }

    if !shared.gate.peer_dial(&peer) {
        warn!(peer = %peer.short(), "peer dial denied by gater");
        return Err(GateError::GaterDisallowedConnection { peer });
    }

    let slot = shared.dial_slot(peer);
    let result = time::timeout_at(deadline, async {
        let _guard = slot.acquire().await;
        dial_locked(shared, peer, addrs).await
    })
    .await
    .unwrap_or(Err(GateError::Timeout));
    drop(slot);

    if let Err(e) = &result {
        if !e.is_policy_denial() {
            debug!(peer = %peer.short(), error = %e, "dial failed");
        }
    }
    result
}

/// The part of a dial that runs while holding the per-peer dial lock.
async fn dial_locked(shared: &Arc<Shared>, peer: PeerId, addrs: Vec<Multiaddr>) -> GateResult<Arc<Connection>> {
    if let Some(conn) = shared.registry.best_connection(&peer).await {
        debug!(peer = %peer.short(), conn = %conn.id(), "reusing open connection");
        return Ok(conn);
    }

    let candidates = filter_addrs(shared, &peer, addrs);
    if candidates.is_empty() {
        warn!(peer = %peer.short(), "no good addresses to dial");
        return Err(GateError::NoGoodAddresses { peer });
    }

    let secured = race(shared, peer, candidates).await?;
    upgrade::finalize(shared, secured, Direction::Outbound).await
}

/// De-duplicate, gate, and route candidate addresses. The gater sees each
/// distinct address exactly once, in input order.
fn filter_addrs(shared: &Shared, peer: &PeerId, addrs: Vec<Multiaddr>) -> Vec<(Multiaddr, Arc<dyn Transport>)> {
    let mut seen = HashSet::new();
    addrs
        .into_iter()
        .filter(|addr| seen.insert(addr.clone()))
        .filter(|addr| {
            let allowed = shared.gate.addr_dial(peer, addr);
            if !allowed {
                debug!(peer = %peer.short(), addr = %addr, "address denied by gater");
            }
            allowed
        })
        .filter_map(|addr| match shared.transports.for_addr(&addr) {
            Some(transport) => Some((addr, transport)),
            None => {
                debug!(peer = %peer.short(), addr = %addr, "no transport for address");
                None
            }
        })
        .collect()
}

/// Race transport dial + handshake across candidates; first success wins.
///
/// Returning drops the `JoinSet`, which aborts every sibling still in
/// flight at its next suspension point.
async fn race(
    shared: &Shared,
    peer: PeerId,
    candidates: Vec<(Multiaddr, Arc<dyn Transport>)>,
) -> GateResult<SecuredConnection> {
    let limiter = Arc::new(Semaphore::new(shared.config.max_parallel_dials));
    let mut dials = JoinSet::new();

    for (addr, transport) in candidates {
        let security = shared.security.clone();
        let limiter = limiter.clone();
        let per_addr_timeout = shared.config.per_addr_timeout;
        let handshake_timeout = shared.config.handshake_timeout;
        dials.spawn(async move {
            let result = match limiter.acquire_owned().await {
                Ok(_permit) => {
                    dial_addr(
                        transport,
                        security,
                        addr.clone(),
                        peer,
                        per_addr_timeout,
                        handshake_timeout,
                    )
                    .await
                }
                Err(_) => Err(GateError::Closed),
            };
            (addr, result)
        });
    }

    let mut errors = Vec::new();
    while let Some(joined) = dials.join_next().await {
        let (addr, result) = match joined {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(peer = %peer.short(), error = %e, "dial task failed");
                continue;
            }
        };
        match result {
            Ok(secured) => {
                dials.abort_all();
                info!(peer = %peer.short(), addr = %addr, "dial won race");
                return Ok(secured);
            }
            Err(e) => {
                debug!(peer = %peer.short(), addr = %addr, error = %e, "address dial failed");
                errors.push((addr, e));
            }
        }
    }

    shared.gate.stats().record_dial_failure();
    Err(GateError::DialFailed { peer, errors })
}

/// One dial attempt: transport connect, then the outbound handshake.
async fn dial_addr(
    transport: Arc<dyn Transport>,
    security: Arc<dyn SecurityUpgrade>,
    addr: Multiaddr,
    peer: PeerId,
    per_addr_timeout: Duration,
    handshake_timeout: Duration,
) -> GateResult<SecuredConnection> {
    let raw = time::timeout(per_addr_timeout, transport.dial(addr))
        .await
        .map_err(|_| GateError::Timeout)??;
    time::timeout(handshake_timeout, security.secure_outbound(raw, peer))
        .await
        .map_err(|_| GateError::Timeout)?
}
