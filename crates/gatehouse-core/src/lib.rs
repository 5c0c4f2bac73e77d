//! gatehouse-core: shared types for the gatehouse connection-gating host.
//!
//! Provides peer identities, transport classification of multiaddresses,
//! the error taxonomy, length-prefixed CBOR framing, abstract transport and
//! security traits, and a plaintext identity-exchange upgrader.

pub mod address;
pub mod codec;
pub mod error;
pub mod identity;
pub mod security;
pub mod transport;

// Re-export commonly used items at crate root.
pub use address::{detect_transport, ConnectedAddrs, Direction, TransportKind};
pub use codec::{cbor_decode, frame_encode, read_frame, write_frame};
pub use error::{DisconnectReason, ErrorClass, GateError, GateResult};
pub use identity::PeerId;
pub use security::PlaintextUpgrader;
pub use transport::{BoxFuture, BoxedIo, Listener, RawConnection, SecuredConnection, SecurityUpgrade, Transport};

pub use multiaddr::{Multiaddr, Protocol};
