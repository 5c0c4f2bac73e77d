//! gatehouse-host: a peer-to-peer host whose every connection passes through
//! a pluggable connection gater.
//!
//! Outbound dials are checked before the peer is dialed, per candidate
//! address, after the security handshake, and just before registration.
//! Inbound connections are checked after transport accept, after the
//! handshake, and before registration. A denial at any checkpoint ends that
//! attempt before it becomes a usable connection.
//!
//! # Quick Start
//!
//! ```no_run
//! use gatehouse_core::{PeerId, TransportKind};
//! use gatehouse_host::{Host, MemoryNetwork, RecordingGater};
//! use std::sync::Arc;
//!
//! # async fn example() -> gatehouse_core::GateResult<()> {
//! let network = MemoryNetwork::new();
//! let remote = Host::builder(PeerId::random()).transport(network.transport()).build()?;
//! let addr = remote.listen("/ip4/127.0.0.1/tcp/0".parse().unwrap()).await?;
//!
//! let gater = Arc::new(RecordingGater::allow_all().addr_dial_with(|_, a| {
//!     TransportKind::detect(a) == Some(TransportKind::Tcp)
//! }));
//! let local = Host::builder(PeerId::random())
//!     .gater(gater)
//!     .transport(network.transport())
//!     .build()?;
//! let conn = local.dial(remote.local_peer(), vec![addr]).await?;
//! println!("connected via {}", conn.transport());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod connection;
pub mod event;
pub mod gater;
pub mod recording;
pub mod registry;
pub mod stats;
pub mod transport;

mod accept;
mod dial;
mod host;
mod upgrade;

pub use config::HostConfig;
pub use connection::{Connection, ConnectionId};
pub use event::HostEvent;
pub use gater::{AllowAll, Checkpoint, ConnectionGater, Decision};
pub use host::{Host, HostBuilder};
pub use recording::{GaterCall, RecordingGater};
pub use registry::ConnectionRegistry;
pub use stats::{GateStats, GateStatsSnapshot};
pub use transport::{MemoryNetwork, MemoryTransport, TransportSet};
pub use upgrade::COMMIT;
