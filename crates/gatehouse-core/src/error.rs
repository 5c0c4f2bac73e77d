use crate::identity::PeerId;
use multiaddr::Multiaddr;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Reason code a gater attaches when it rejects an upgraded connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct DisconnectReason(pub u32);

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "reason {}", self.0)
    }
}

/// Coarse classification of a [`GateError`].
///
/// Lets callers tell "never tried because of policy" apart from "tried and
/// failed on the network" and "tried and rejected by a late checkpoint"
/// without matching on messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// A gater checkpoint said no.
    PolicyDenied,
    /// No candidate address survived filtering (or none were supplied).
    NoCandidates,
    /// Transport or handshake failure. Other addresses may still work.
    Transport,
    /// Misuse or misconfiguration of the host.
    Configuration,
}

/// Errors produced by the gatehouse dial/accept pipeline.
#[derive(Debug, Error)]
pub enum GateError {
    #[error("gater disallowed connection to peer {peer}")]
    GaterDisallowedConnection { peer: PeerId },

    #[error("no good addresses for peer {peer}")]
    NoGoodAddresses { peer: PeerId },

    #[error("gater rejected secured connection with peer {peer} via {addr}")]
    SecurityDenied { peer: PeerId, addr: Multiaddr },

    #[error("gater rejected upgraded connection with peer {peer}{}", reason_suffix(.reason))]
    UpgradeDenied {
        peer: PeerId,
        reason: Option<DisconnectReason>,
    },

    #[error("gater rejected inbound connection from {remote}")]
    AcceptDenied { remote: Multiaddr },

    #[error("dial to self attempted")]
    DialSelf,

    #[error("all dials to peer {peer} failed: {}", summarize(.errors))]
    DialFailed {
        peer: PeerId,
        errors: Vec<(Multiaddr, GateError)>,
    },

    #[error("connection refused: {0}")]
    ConnectionRefused(Multiaddr),

    #[error("unsupported transport: {0}")]
    UnsupportedTransport(Multiaddr),

    #[error("address already in use: {0}")]
    AddrInUse(Multiaddr),

    #[error("handshake failed: {0}")]
    Handshake(String),

    #[error("peer id mismatch: expected {expected}, got {actual}")]
    PeerIdMismatch { expected: PeerId, actual: PeerId },

    #[error("codec error: {0}")]
    Codec(String),

    #[error("connection closed")]
    Closed,

    #[error("timeout")]
    Timeout,

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl GateError {
    /// Classify this error.
    pub fn class(&self) -> ErrorClass {
        match self {
            GateError::GaterDisallowedConnection { .. }
            | GateError::SecurityDenied { .. }
            | GateError::UpgradeDenied { .. }
            | GateError::AcceptDenied { .. } => ErrorClass::PolicyDenied,
            GateError::NoGoodAddresses { .. } => ErrorClass::NoCandidates,
            GateError::DialSelf | GateError::AddrInUse(_) | GateError::Config(_) => {
                ErrorClass::Configuration
            }
            GateError::DialFailed { .. }
            | GateError::ConnectionRefused(_)
            | GateError::UnsupportedTransport(_)
            | GateError::Handshake(_)
            | GateError::PeerIdMismatch { .. }
            | GateError::Codec(_)
            | GateError::Closed
            | GateError::Timeout
            | GateError::Io(_) => ErrorClass::Transport,
        }
    }

    /// Whether a gater checkpoint produced this error.
    pub fn is_policy_denial(&self) -> bool {
        self.class() == ErrorClass::PolicyDenied
    }

    /// Whether a later attempt (or another address) might succeed.
    /// Policy denials are final and never retried automatically.
    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Transport
    }
}

impl From<ciborium::de::Error<std::io::Error>> for GateError {
    fn from(e: ciborium::de::Error<std::io::Error>) -> Self {
        GateError::Codec(e.to_string())
    }
}

impl From<ciborium::ser::Error<std::io::Error>> for GateError {
    fn from(e: ciborium::ser::Error<std::io::Error>) -> Self {
        GateError::Codec(e.to_string())
    }
}

fn reason_suffix(reason: &Option<DisconnectReason>) -> String {
    match reason {
        Some(r) => format!(" ({r})"),
        None => String::new(),
    }
}

fn summarize(errors: &[(Multiaddr, GateError)]) -> String {
    if errors.is_empty() {
        return "no dial completed".to_string();
    }
    errors
        .iter()
        .map(|(addr, e)| format!("{addr}: {e}"))
        .collect::<Vec<_>>()
        .join("; ")
}

pub type GateResult<T> = Result<T, GateError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> Multiaddr {
        s.parse().unwrap()
    }

    #[test]
    fn policy_denials_are_distinct_from_transport_failures() {
        let peer = PeerId::random();
        let denied = GateError::GaterDisallowedConnection { peer };
        let failed = GateError::DialFailed {
            peer,
            errors: vec![(
                addr("/ip4/127.0.0.1/tcp/4001"),
                GateError::ConnectionRefused(addr("/ip4/127.0.0.1/tcp/4001")),
            )],
        };
        let secured = GateError::SecurityDenied {
            peer,
            addr: addr("/ip4/127.0.0.1/tcp/4001"),
        };

        assert!(denied.is_policy_denial());
        assert!(secured.is_policy_denial());
        assert!(!failed.is_policy_denial());
        assert!(failed.is_retryable());
        assert!(!denied.is_retryable());
    }

    #[test]
    fn no_good_addresses_has_its_own_class() {
        let err = GateError::NoGoodAddresses { peer: PeerId::random() };
        assert_eq!(err.class(), ErrorClass::NoCandidates);
        assert!(!err.is_policy_denial());
        assert!(!err.is_retryable());
    }

    #[test]
    fn upgrade_denied_message_carries_reason() {
        let peer = PeerId::random();
        let with = GateError::UpgradeDenied {
            peer,
            reason: Some(DisconnectReason(7)),
        };
        let without = GateError::UpgradeDenied { peer, reason: None };
        assert!(with.to_string().ends_with("(reason 7)"));
        assert!(!without.to_string().contains("reason"));
    }

    #[test]
    fn dial_failed_lists_every_address() {
        let a = addr("/ip4/127.0.0.1/tcp/1");
        let b = addr("/ip4/127.0.0.1/udp/2/quic-v1");
        let err = GateError::DialFailed {
            peer: PeerId::random(),
            errors: vec![
                (a.clone(), GateError::ConnectionRefused(a)),
                (b, GateError::Timeout),
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("/ip4/127.0.0.1/tcp/1: connection refused"));
        assert!(msg.contains("/ip4/127.0.0.1/udp/2/quic-v1: timeout"));
    }
}
