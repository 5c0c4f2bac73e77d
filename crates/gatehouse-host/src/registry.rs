//! Registry of open connections, indexed by peer.
//!
//! The registry is the last gate: [`ConnectionRegistry::admit`] consults the
//! upgraded checkpoint and only inserts connections it allows, so every
//! connection found here has passed all checkpoints for its direction.

use gatehouse_core::{Direction, GateError, GateResult, PeerId};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::connection::{Connection, ConnectionId};
use crate::gater::Gate;

/// Open connections by remote peer.
#[derive(Default)]
pub struct ConnectionRegistry {
    conns: RwLock<HashMap<PeerId, Vec<Arc<Connection>>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run the upgraded checkpoint and register the connection if allowed.
    /// A denied connection is closed and never becomes visible.
    pub(crate) async fn admit(&self, conn: Connection, gate: &Gate) -> GateResult<Arc<Connection>> {
        let decision = gate.upgraded(&conn);
        if !decision.is_allowed() {
            warn!(
                peer = %conn.peer().short(),
                conn = %conn.id(),
                direction = %conn.direction(),
                reason = ?decision.reason(),
                "upgraded connection denied by gater"
            );
            let peer = conn.peer();
            conn.close().await;
            return Err(GateError::UpgradeDenied {
                peer,
                reason: decision.reason(),
            });
        }

        let conn = Arc::new(conn);
        self.conns
            .write()
            .await
            .entry(conn.peer())
            .or_default()
            .push(conn.clone());
        debug!(peer = %conn.peer().short(), conn = %conn.id(), "connection registered");
        Ok(conn)
    }

    /// Remove one connection. Returns whether it was registered.
    pub async fn remove(&self, peer: &PeerId, id: ConnectionId) -> bool {
        let mut conns = self.conns.write().await;
        let Some(list) = conns.get_mut(peer) else {
            return false;
        };
        let before = list.len();
        list.retain(|c| c.id() != id);
        let removed = list.len() != before;
        if list.is_empty() {
            conns.remove(peer);
        }
        removed
    }

    /// Remove and return every connection to `peer`.
    pub async fn remove_peer(&self, peer: &PeerId) -> Vec<Arc<Connection>> {
        self.conns.write().await.remove(peer).unwrap_or_default()
    }

    /// Remove and return every connection.
    pub async fn drain(&self) -> Vec<Arc<Connection>> {
        let mut conns = self.conns.write().await;
        conns.drain().flat_map(|(_, list)| list).collect()
    }

    /// All open connections to `peer`.
    pub async fn connections_to(&self, peer: &PeerId) -> Vec<Arc<Connection>> {
        self.conns
            .read()
            .await
            .get(peer)
            .map(|list| list.iter().filter(|c| !c.is_closed()).cloned().collect())
            .unwrap_or_default()
    }

    /// An open connection to `peer`, preferring outbound ones.
    pub async fn best_connection(&self, peer: &PeerId) -> Option<Arc<Connection>> {
        let conns = self.connections_to(peer).await;
        conns
            .iter()
            .find(|c| c.direction() == Direction::Outbound)
            .or_else(|| conns.first())
            .cloned()
    }

    /// Peers with at least one open connection.
    pub async fn peers(&self) -> Vec<PeerId> {
        let mut peers: Vec<PeerId> = self
            .conns
            .read()
            .await
            .iter()
            .filter(|(_, list)| list.iter().any(|c| !c.is_closed()))
            .map(|(peer, _)| *peer)
            .collect();
        peers.sort();
        peers
    }

    /// Number of open connections. Closed ones awaiting removal are skipped.
    pub async fn count(&self) -> usize {
        self.conns
            .read()
            .await
            .values()
            .flatten()
            .filter(|c| !c.is_closed())
            .count()
    }
}
