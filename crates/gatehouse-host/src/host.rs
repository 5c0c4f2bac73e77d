//! The host: owns the gater, transports, security upgrader and connection
//! registry, and coordinates the lifecycle of every dial and listener.

use gatehouse_core::{GateError, GateResult, Multiaddr, PeerId, PlaintextUpgrader, SecurityUpgrade, Transport};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use tokio::sync::{broadcast, mpsc, Mutex, MutexGuard};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::accept;
use crate::config::HostConfig;
use crate::connection::Connection;
use crate::dial;
use crate::event::HostEvent;
use crate::gater::{AllowAll, ConnectionGater, Gate};
use crate::registry::ConnectionRegistry;
use crate::stats::GateStatsSnapshot;
use crate::transport::TransportSet;

/// State shared between the host handle, dials, and accept loops.
pub(crate) struct Shared {
    pub(crate) local_peer: PeerId,
    pub(crate) gate: Gate,
    pub(crate) transports: TransportSet,
    pub(crate) security: Arc<dyn SecurityUpgrade>,
    pub(crate) registry: ConnectionRegistry,
    pub(crate) config: HostConfig,
    events: broadcast::Sender<HostEvent>,
    shutdown_tx: broadcast::Sender<()>,
    closed: AtomicBool,
    next_conn_id: AtomicU64,
    /// Serializes concurrent dials to the same peer.
    dial_locks: StdMutex<HashMap<PeerId, Arc<Mutex<()>>>>,
}

impl Shared {
    pub(crate) fn next_connection_id(&self) -> u64 {
        self.next_conn_id.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn emit(&self, event: HostEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Claim this peer's dial slot. Dropping the slot releases the
    /// per-peer lock entry once no other dial holds or awaits it.
    pub(crate) fn dial_slot(&self, peer: PeerId) -> DialSlot<'_> {
        let lock = self
            .dial_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(peer)
            .or_default()
            .clone();
        DialSlot {
            shared: self,
            peer,
            lock,
        }
    }

    /// Drop `conn` from the registry once it closes, whoever closed it.
    pub(crate) fn watch_close(self: &Arc<Self>, conn: &Arc<Connection>) {
        let shared = self.clone();
        let conn = conn.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        tokio::spawn(async move {
            tokio::select! {
                _ = conn.closed() => {}
                // Shutdown drains the registry itself.
                _ = shutdown_rx.recv() => return,
            }
            if shared.registry.remove(&conn.peer(), conn.id()).await {
                debug!(peer = %conn.peer().short(), conn = %conn.id(), "connection closed");
                shared.emit(HostEvent::ConnectionClosed {
                    peer: conn.peer(),
                    id: conn.id(),
                });
            }
        });
    }

    #[cfg(test)]
    pub(crate) fn dial_lock_count(&self) -> usize {
        self.dial_locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// A claim on one peer's dial lock.
pub(crate) struct DialSlot<'a> {
    shared: &'a Shared,
    peer: PeerId,
    lock: Arc<Mutex<()>>,
}

impl DialSlot<'_> {
    pub(crate) async fn acquire(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().await
    }
}

impl Drop for DialSlot<'_> {
    fn drop(&mut self) {
        let mut locks = self.shared.dial_locks.lock().unwrap_or_else(PoisonError::into_inner);
        // One reference in the map, one in this slot.
        if locks.get(&self.peer).is_some_and(|lock| Arc::strong_count(lock) <= 2) {
            locks.remove(&self.peer);
        }
    }
}

/// Builder for [`Host`].
pub struct HostBuilder {
    local_peer: PeerId,
    gater: Option<Arc<dyn ConnectionGater>>,
    transports: TransportSet,
    security: Option<Arc<dyn SecurityUpgrade>>,
    config: HostConfig,
}

impl HostBuilder {
    pub fn new(local_peer: PeerId) -> Self {
        Self {
            local_peer,
            gater: None,
            transports: TransportSet::new(),
            security: None,
            config: HostConfig::default(),
        }
    }

    /// Install the connection gater. Without one every checkpoint allows.
    pub fn gater(mut self, gater: Arc<dyn ConnectionGater>) -> Self {
        self.gater = Some(gater);
        self
    }

    pub fn transport<T: Transport + 'static>(mut self, transport: T) -> Self {
        self.transports.add(Arc::new(transport));
        self
    }

    /// Override the security handshake. Defaults to [`PlaintextUpgrader`].
    pub fn security(mut self, security: Arc<dyn SecurityUpgrade>) -> Self {
        self.security = Some(security);
        self
    }

    pub fn config(mut self, config: HostConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> GateResult<Host> {
        if self.transports.is_empty() {
            return Err(GateError::Config("host needs at least one transport".into()));
        }
        if self.config.max_parallel_dials == 0 || self.config.event_buffer == 0 {
            return Err(GateError::Config(
                "max_parallel_dials and event_buffer must be at least 1".into(),
            ));
        }

        let gater = self.gater.unwrap_or_else(|| Arc::new(AllowAll));
        let security = self
            .security
            .unwrap_or_else(|| Arc::new(PlaintextUpgrader::new(self.local_peer)));
        let (events, _) = broadcast::channel(self.config.event_buffer);

        info!(
            peer = %self.local_peer.short(),
            transports = ?self.transports.kinds(),
            security = security.protocol(),
            "host created"
        );

        Ok(Host {
            shared: Arc::new(Shared {
                local_peer: self.local_peer,
                gate: Gate::new(gater),
                transports: self.transports,
                security,
                registry: ConnectionRegistry::new(),
                config: self.config,
                events,
                shutdown_tx: broadcast::channel(1).0,
                closed: AtomicBool::new(false),
                next_conn_id: AtomicU64::new(1),
                dial_locks: StdMutex::new(HashMap::new()),
            }),
            listeners: Mutex::new(HashMap::new()),
        })
    }
}

/// Bookkeeping for a running accept loop.
struct ListenerEntry {
    /// Dropping or sending stops the accept loop.
    cancel_tx: mpsc::Sender<()>,
}

/// A peer-to-peer host with connection gating.
pub struct Host {
    shared: Arc<Shared>,
    listeners: Mutex<HashMap<Multiaddr, ListenerEntry>>,
}

impl Host {
    pub fn builder(local_peer: PeerId) -> HostBuilder {
        HostBuilder::new(local_peer)
    }

    pub fn local_peer(&self) -> PeerId {
        self.shared.local_peer
    }

    pub fn config(&self) -> &HostConfig {
        &self.shared.config
    }

    /// Dial `peer` on the given candidate addresses, bounded by the
    /// configured dial timeout.
    pub async fn dial(&self, peer: PeerId, addrs: Vec<Multiaddr>) -> GateResult<Arc<Connection>> {
        let deadline = Instant::now() + self.shared.config.dial_timeout;
        self.dial_until(peer, addrs, deadline).await
    }

    /// Dial `peer`, giving up at `deadline`. Dropping the returned future
    /// cancels every in-flight address attempt.
    pub async fn dial_until(
        &self,
        peer: PeerId,
        addrs: Vec<Multiaddr>,
        deadline: Instant,
    ) -> GateResult<Arc<Connection>> {
        dial::dial_peer(&self.shared, peer, addrs, deadline).await
    }

    /// Bind `addr` and start accepting. Returns the bound address.
    pub async fn listen(&self, addr: Multiaddr) -> GateResult<Multiaddr> {
        if self.shared.is_closed() {
            return Err(GateError::Closed);
        }
        let transport = self.shared.transports.require(&addr)?;
        let listener = transport.listen(addr).await?;
        let bound = listener.local_addr().clone();

        let (cancel_tx, cancel_rx) = mpsc::channel::<()>(1);
        self.listeners
            .lock()
            .await
            .insert(bound.clone(), ListenerEntry { cancel_tx });

        let shared = self.shared.clone();
        let shutdown_rx = self.shared.shutdown_tx.subscribe();
        tokio::spawn(accept::accept_loop(shared, listener, cancel_rx, shutdown_rx));

        info!(addr = %bound, "listening");
        Ok(bound)
    }

    /// Bind every address in the config's listen list.
    pub async fn start_listening(&self) -> GateResult<Vec<Multiaddr>> {
        let mut bound = Vec::with_capacity(self.shared.config.listen_addrs.len());
        for addr in self.shared.config.listen_addrs.clone() {
            bound.push(self.listen(addr).await?);
        }
        Ok(bound)
    }

    /// Stop the listener bound at `addr`. Returns whether one existed.
    pub async fn close_listener(&self, addr: &Multiaddr) -> bool {
        match self.listeners.lock().await.remove(addr) {
            Some(entry) => {
                let _ = entry.cancel_tx.send(()).await;
                true
            }
            None => false,
        }
    }

    pub async fn listen_addrs(&self) -> Vec<Multiaddr> {
        self.listeners.lock().await.keys().cloned().collect()
    }

    /// Open connections to `peer`.
    pub async fn connections_to(&self, peer: &PeerId) -> Vec<Arc<Connection>> {
        self.shared.registry.connections_to(peer).await
    }

    pub async fn connected_peers(&self) -> Vec<PeerId> {
        self.shared.registry.peers().await
    }

    pub async fn connection_count(&self) -> usize {
        self.shared.registry.count().await
    }

    /// Close and unregister one connection.
    pub async fn close_connection(&self, conn: &Connection) {
        let removed = self.shared.registry.remove(&conn.peer(), conn.id()).await;
        conn.close().await;
        if removed {
            debug!(peer = %conn.peer().short(), conn = %conn.id(), "connection closed");
            self.shared.emit(HostEvent::ConnectionClosed {
                peer: conn.peer(),
                id: conn.id(),
            });
        }
    }

    /// Close every connection to `peer`. Returns how many were closed.
    pub async fn close_peer(&self, peer: &PeerId) -> usize {
        let conns = self.shared.registry.remove_peer(peer).await;
        for conn in &conns {
            conn.close().await;
            self.shared.emit(HostEvent::ConnectionClosed {
                peer: conn.peer(),
                id: conn.id(),
            });
        }
        conns.len()
    }

    /// Subscribe to host events.
    pub fn subscribe(&self) -> broadcast::Receiver<HostEvent> {
        self.shared.events.subscribe()
    }

    /// Snapshot of gate counters.
    pub fn stats(&self) -> GateStatsSnapshot {
        self.shared.gate.stats().snapshot()
    }

    /// Stop all listeners, close all connections, and refuse new dials.
    pub async fn shutdown(&self) {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let _ = self.shared.shutdown_tx.send(());
        self.listeners.lock().await.clear();

        let conns = self.shared.registry.drain().await;
        for conn in &conns {
            conn.close().await;
        }
        info!(
            peer = %self.shared.local_peer.short(),
            closed = conns.len(),
            "host shut down"
        );
    }
}

impl Drop for Host {
    fn drop(&mut self) {
        // Stop accept loops and close watchers still holding shared state.
        let _ = self.shared.shutdown_tx.send(());
    }
}
