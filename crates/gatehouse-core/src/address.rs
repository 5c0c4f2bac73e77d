//! Transport classification of multiaddresses.
//!
//! Every candidate address is mapped to a [`TransportKind`] from its
//! protocol stack:
//! - `/tcp` → TCP, `/tcp/../ws` or `/wss` → WebSocket
//! - `/udp/../quic` → QUIC (draft-29), `/udp/../quic-v1` → QUIC v1
//! - `/udp/../quic-v1/webtransport` → WebTransport
//! - `/memory` → in-process transport

use multiaddr::{Multiaddr, Protocol};
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::{GateError, GateResult};

/// Transport family, inferred from the address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TransportKind {
    Tcp,
    WebSocket,
    Quic,
    QuicV1,
    WebTransport,
    Memory,
}

impl TransportKind {
    pub const ALL: [TransportKind; 6] = [
        TransportKind::Tcp,
        TransportKind::WebSocket,
        TransportKind::Quic,
        TransportKind::QuicV1,
        TransportKind::WebTransport,
        TransportKind::Memory,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            TransportKind::Tcp => "tcp",
            TransportKind::WebSocket => "ws",
            TransportKind::Quic => "quic",
            TransportKind::QuicV1 => "quic-v1",
            TransportKind::WebTransport => "webtransport",
            TransportKind::Memory => "memory",
        }
    }

    /// Classify an address, or `None` if no known transport handles it.
    pub fn detect(addr: &Multiaddr) -> Option<Self> {
        let mut tcp = false;
        let mut udp = false;
        let mut ws = false;
        let mut quic = false;
        let mut quic_v1 = false;
        let mut webtransport = false;

        for proto in addr.iter() {
            match proto {
                Protocol::Memory(_) => return Some(TransportKind::Memory),
                Protocol::Tcp(_) => tcp = true,
                Protocol::Udp(_) => udp = true,
                Protocol::Ws(_) | Protocol::Wss(_) => ws = true,
                Protocol::Quic => quic = true,
                Protocol::QuicV1 => quic_v1 = true,
                Protocol::WebTransport => webtransport = true,
                // Relayed addresses need a relay transport we do not have.
                Protocol::P2pCircuit => return None,
                _ => {}
            }
        }

        match (tcp, udp) {
            (true, false) if ws => Some(TransportKind::WebSocket),
            (true, false) => Some(TransportKind::Tcp),
            (false, true) if quic_v1 && webtransport => Some(TransportKind::WebTransport),
            (false, true) if quic_v1 => Some(TransportKind::QuicV1),
            (false, true) if quic && !webtransport => Some(TransportKind::Quic),
            _ => None,
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for TransportKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl FromStr for TransportKind {
    type Err = GateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_lowercase();
        TransportKind::ALL
            .into_iter()
            .find(|k| k.name() == lower)
            .or(match lower.as_str() {
                "websocket" | "wss" => Some(TransportKind::WebSocket),
                "quicv1" => Some(TransportKind::QuicV1),
                "wt" => Some(TransportKind::WebTransport),
                _ => None,
            })
            .ok_or_else(|| GateError::Config(format!("unknown transport kind: {s}")))
    }
}

/// Determine the transport kind of an address.
pub fn detect_transport(addr: &Multiaddr) -> GateResult<TransportKind> {
    TransportKind::detect(addr).ok_or_else(|| GateError::UnsupportedTransport(addr.clone()))
}

/// Which side initiated a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Inbound,
    Outbound,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Inbound => f.write_str("inbound"),
            Direction::Outbound => f.write_str("outbound"),
        }
    }
}

/// Local and remote endpoint of a connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectedAddrs {
    pub local: Multiaddr,
    pub remote: Multiaddr,
}

/// The TCP/UDP/memory port of an address, if it has one.
pub fn port_of(addr: &Multiaddr) -> Option<u64> {
    addr.iter().find_map(|proto| match proto {
        Protocol::Tcp(p) | Protocol::Udp(p) => Some(u64::from(p)),
        Protocol::Memory(p) => Some(p),
        _ => None,
    })
}

/// Replace the TCP/UDP/memory port of an address.
pub fn with_port(addr: &Multiaddr, port: u16) -> Multiaddr {
    addr.iter()
        .map(|proto| match proto {
            Protocol::Tcp(_) => Protocol::Tcp(port),
            Protocol::Udp(_) => Protocol::Udp(port),
            Protocol::Memory(_) => Protocol::Memory(u64::from(port)),
            other => other,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> Multiaddr {
        s.parse().unwrap()
    }

    #[test]
    fn detects_every_supported_stack() {
        let cases = [
            ("/ip4/127.0.0.1/tcp/0", TransportKind::Tcp),
            ("/ip4/127.0.0.1/tcp/0/ws", TransportKind::WebSocket),
            ("/dns4/example.com/tcp/443/wss", TransportKind::WebSocket),
            ("/ip4/127.0.0.1/udp/0/quic", TransportKind::Quic),
            ("/ip4/127.0.0.1/udp/0/quic-v1", TransportKind::QuicV1),
            ("/ip4/127.0.0.1/udp/0/quic-v1/webtransport", TransportKind::WebTransport),
            ("/memory/42", TransportKind::Memory),
        ];
        for (s, kind) in cases {
            assert_eq!(TransportKind::detect(&addr(s)), Some(kind), "{s}");
        }
    }

    #[test]
    fn rejects_unknown_stacks() {
        assert!(detect_transport(&addr("/ip4/127.0.0.1/udp/0")).is_err());
        assert!(detect_transport(&addr("/ip4/127.0.0.1")).is_err());
        assert!(detect_transport(&addr("/ip4/127.0.0.1/tcp/1/p2p-circuit")).is_err());
    }

    #[test]
    fn kind_names_parse_back() {
        for kind in TransportKind::ALL {
            assert_eq!(kind.name().parse::<TransportKind>().unwrap(), kind);
        }
        assert_eq!("WT".parse::<TransportKind>().unwrap(), TransportKind::WebTransport);
        assert!("smoke-signal".parse::<TransportKind>().is_err());
    }

    #[test]
    fn port_rewrite_keeps_the_rest_of_the_stack() {
        let a = addr("/ip4/127.0.0.1/udp/0/quic-v1/webtransport");
        let b = with_port(&a, 4433);
        assert_eq!(b, addr("/ip4/127.0.0.1/udp/4433/quic-v1/webtransport"));
        assert_eq!(port_of(&b), Some(4433));
        assert_eq!(port_of(&addr("/ip4/127.0.0.1")), None);
    }
}
