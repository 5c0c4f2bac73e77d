//! Abstract transport and security traits.
//!
//! Transports (TCP, WebSocket, QUIC, WebTransport, in-memory) produce
//! [`RawConnection`]s; a [`SecurityUpgrade`] turns a raw connection into a
//! [`SecuredConnection`] with a known remote [`PeerId`]. Both traits return
//! boxed futures so they can be stored as trait objects and raced from
//! spawned tasks.

use crate::address::{ConnectedAddrs, TransportKind};
use crate::error::GateResult;
use crate::identity::PeerId;
use multiaddr::Multiaddr;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A bidirectional byte stream.
pub trait AsyncIo: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> AsyncIo for T {}

pub type BoxedIo = Box<dyn AsyncIo>;

/// A transport-level connection that has not been through the security
/// handshake. The remote identity is unknown.
pub struct RawConnection {
    pub io: BoxedIo,
    pub addrs: ConnectedAddrs,
    pub kind: TransportKind,
}

impl RawConnection {
    /// Shut down the write half and drop the stream.
    pub async fn close(mut self) {
        let _ = self.io.shutdown().await;
    }
}

impl fmt::Debug for RawConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawConnection")
            .field("addrs", &self.addrs)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// A connection whose remote identity was established by the handshake.
pub struct SecuredConnection {
    pub peer: PeerId,
    pub io: BoxedIo,
    pub addrs: ConnectedAddrs,
    pub kind: TransportKind,
}

impl SecuredConnection {
    pub async fn close(mut self) {
        let _ = self.io.shutdown().await;
    }
}

impl fmt::Debug for SecuredConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecuredConnection")
            .field("peer", &self.peer)
            .field("addrs", &self.addrs)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// A bound listener. Dropping it stops accepting.
pub trait Listener: Send {
    /// The address actually bound (port 0 resolved).
    fn local_addr(&self) -> &Multiaddr;

    /// Wait for the next inbound connection. Returns
    /// [`GateError::Closed`](crate::GateError::Closed) once the listener can
    /// no longer produce connections.
    fn accept(&mut self) -> BoxFuture<'_, GateResult<RawConnection>>;
}

/// A transport able to dial and listen on the address families it reports.
///
/// Implementations must hand every accepted connection to the host before
/// exposing any application data on it.
pub trait Transport: Send + Sync {
    /// Transport kinds this implementation serves.
    fn kinds(&self) -> &[TransportKind];

    /// Open a raw connection to `addr`.
    fn dial(&self, addr: Multiaddr) -> BoxFuture<'static, GateResult<RawConnection>>;

    /// Bind a listener on `addr`.
    fn listen(&self, addr: Multiaddr) -> BoxFuture<'static, GateResult<Box<dyn Listener>>>;
}

/// The identity/security handshake.
///
/// Must report the negotiated remote identity exactly once per connection.
pub trait SecurityUpgrade: Send + Sync {
    /// Protocol identifier, for logs.
    fn protocol(&self) -> &'static str;

    /// Run the dialer side. Fails if the remote is not `expected`.
    fn secure_outbound(
        &self,
        raw: RawConnection,
        expected: PeerId,
    ) -> BoxFuture<'static, GateResult<SecuredConnection>>;

    /// Run the listener side.
    fn secure_inbound(&self, raw: RawConnection) -> BoxFuture<'static, GateResult<SecuredConnection>>;
}
