//! In-process transport.
//!
//! A [`MemoryNetwork`] is a switchboard of bound addresses; any number of
//! [`MemoryTransport`]s share it. Connections are `tokio::io::duplex` pairs.
//! The network accepts addresses of every [`TransportKind`] so a single
//! process can exercise the TCP, WebSocket, QUIC and WebTransport dial paths
//! without sockets. Every dial is logged, which lets callers check whether
//! transport I/O was attempted at all.

use gatehouse_core::address::{port_of, with_port};
use gatehouse_core::{
    BoxFuture, ConnectedAddrs, GateError, GateResult, Listener, Multiaddr, RawConnection, Transport,
    TransportKind,
};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tracing::debug;

/// Buffer size of each in-memory stream.
const DUPLEX_BUFFER: usize = 64 * 1024;

/// Pending inbound connections per listener.
const ACCEPT_BACKLOG: usize = 64;

/// Most recent dials kept in the log; older entries are discarded.
pub const DIAL_LOG_CAPACITY: usize = 1024;

/// First port handed out for port-0 binds and dialer-side addresses.
const FIRST_EPHEMERAL_PORT: u16 = 10_000;

struct NetworkState {
    listeners: HashMap<Multiaddr, mpsc::Sender<RawConnection>>,
    next_port: u16,
    dials: VecDeque<Multiaddr>,
    dial_count: usize,
}

impl NetworkState {
    fn allocate_port(&mut self) -> u16 {
        let port = self.next_port;
        self.next_port = self.next_port.checked_add(1).unwrap_or(FIRST_EPHEMERAL_PORT);
        port
    }
}

/// Shared switchboard for in-memory transports.
#[derive(Clone)]
pub struct MemoryNetwork {
    state: Arc<Mutex<NetworkState>>,
}

impl Default for MemoryNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(NetworkState {
                listeners: HashMap::new(),
                next_port: FIRST_EPHEMERAL_PORT,
                dials: VecDeque::new(),
                dial_count: 0,
            })),
        }
    }

    /// A transport on this network serving every transport kind.
    pub fn transport(&self) -> MemoryTransport {
        MemoryTransport::with_kinds(self.clone(), &TransportKind::ALL)
    }

    /// The last [`DIAL_LOG_CAPACITY`] addresses dialed, oldest first.
    pub fn dial_log(&self) -> Vec<Multiaddr> {
        self.lock().dials.iter().cloned().collect()
    }

    /// Dials attempted over the network's lifetime.
    pub fn dial_count(&self) -> usize {
        self.lock().dial_count
    }

    /// Addresses currently bound.
    pub fn bound_addrs(&self) -> Vec<Multiaddr> {
        self.lock().listeners.keys().cloned().collect()
    }

    fn lock(&self) -> MutexGuard<'_, NetworkState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn bind(&self, addr: Multiaddr) -> GateResult<MemoryListener> {
        let kind = gatehouse_core::detect_transport(&addr)?;
        let mut state = self.lock();

        let addr = if port_of(&addr) == Some(0) {
            let port = state.allocate_port();
            with_port(&addr, port)
        } else {
            addr
        };
        if state.listeners.contains_key(&addr) {
            return Err(GateError::AddrInUse(addr));
        }

        let (tx, rx) = mpsc::channel(ACCEPT_BACKLOG);
        state.listeners.insert(addr.clone(), tx);
        debug!(addr = %addr, kind = %kind, "memory listener bound");

        Ok(MemoryListener {
            addr,
            rx,
            network: self.clone(),
        })
    }

    fn unbind(&self, addr: &Multiaddr) {
        self.lock().listeners.remove(addr);
    }

    async fn connect(&self, addr: Multiaddr) -> GateResult<RawConnection> {
        let kind = gatehouse_core::detect_transport(&addr)?;
        let (sender, dialer_addr) = {
            let mut state = self.lock();
            if state.dials.len() == DIAL_LOG_CAPACITY {
                state.dials.pop_front();
            }
            state.dials.push_back(addr.clone());
            state.dial_count += 1;
            let sender = state
                .listeners
                .get(&addr)
                .cloned()
                .ok_or_else(|| GateError::ConnectionRefused(addr.clone()))?;
            let port = state.allocate_port();
            (sender, with_port(&addr, port))
        };

        let (dialer_io, listener_io) = tokio::io::duplex(DUPLEX_BUFFER);
        let inbound = RawConnection {
            io: Box::new(listener_io),
            addrs: ConnectedAddrs {
                local: addr.clone(),
                remote: dialer_addr.clone(),
            },
            kind,
        };
        if sender.send(inbound).await.is_err() {
            self.unbind(&addr);
            return Err(GateError::ConnectionRefused(addr));
        }

        Ok(RawConnection {
            io: Box::new(dialer_io),
            addrs: ConnectedAddrs {
                local: dialer_addr,
                remote: addr,
            },
            kind,
        })
    }
}

/// [`Transport`] over a [`MemoryNetwork`].
#[derive(Clone)]
pub struct MemoryTransport {
    network: MemoryNetwork,
    kinds: Vec<TransportKind>,
}

impl MemoryTransport {
    /// A transport that only claims the given kinds.
    pub fn with_kinds(network: MemoryNetwork, kinds: &[TransportKind]) -> Self {
        Self {
            network,
            kinds: kinds.to_vec(),
        }
    }

    pub fn network(&self) -> &MemoryNetwork {
        &self.network
    }
}

impl Transport for MemoryTransport {
    fn kinds(&self) -> &[TransportKind] {
        &self.kinds
    }

    fn dial(&self, addr: Multiaddr) -> BoxFuture<'static, GateResult<RawConnection>> {
        let network = self.network.clone();
        Box::pin(async move { network.connect(addr).await })
    }

    fn listen(&self, addr: Multiaddr) -> BoxFuture<'static, GateResult<Box<dyn Listener>>> {
        let network = self.network.clone();
        Box::pin(async move {
            let listener = network.bind(addr)?;
            Ok(Box::new(listener) as Box<dyn Listener>)
        })
    }
}

/// A bound in-memory address. Unbinds on drop.
pub struct MemoryListener {
    addr: Multiaddr,
    rx: mpsc::Receiver<RawConnection>,
    network: MemoryNetwork,
}

impl Listener for MemoryListener {
    fn local_addr(&self) -> &Multiaddr {
        &self.addr
    }

    fn accept(&mut self) -> BoxFuture<'_, GateResult<RawConnection>> {
        Box::pin(async move { self.rx.recv().await.ok_or(GateError::Closed) })
    }
}

impl Drop for MemoryListener {
    fn drop(&mut self) {
        self.network.unbind(&self.addr);
    }
}
