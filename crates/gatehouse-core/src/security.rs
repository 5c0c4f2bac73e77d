//! Plaintext identity exchange.
//!
//! Both sides send one `Exchange` frame carrying their peer id and then read
//! the remote's. No keys are proven: this upgrader only establishes *which*
//! peer claims to be on the other end, which is all the gating pipeline
//! needs. Production hosts plug a cryptographic handshake in through the
//! same [`SecurityUpgrade`] trait.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::codec::{read_frame, write_frame};
use crate::error::{GateError, GateResult};
use crate::identity::PeerId;
use crate::transport::{BoxFuture, RawConnection, SecuredConnection, SecurityUpgrade};

/// Protocol identifier sent in every exchange.
pub const PLAINTEXT_PROTOCOL: &str = "/plaintext/2.0.0";

/// Upper bound on an exchange frame.
const MAX_EXCHANGE_FRAME: usize = 4096;

#[derive(Debug, Serialize, Deserialize)]
struct Exchange {
    protocol: String,
    peer_id: Vec<u8>,
}

/// [`SecurityUpgrade`] that swaps peer ids in the clear.
#[derive(Debug, Clone)]
pub struct PlaintextUpgrader {
    local: PeerId,
}

impl PlaintextUpgrader {
    pub fn new(local: PeerId) -> Self {
        Self { local }
    }
}

impl SecurityUpgrade for PlaintextUpgrader {
    fn protocol(&self) -> &'static str {
        PLAINTEXT_PROTOCOL
    }

    fn secure_outbound(
        &self,
        raw: RawConnection,
        expected: PeerId,
    ) -> BoxFuture<'static, GateResult<SecuredConnection>> {
        let local = self.local;
        Box::pin(async move {
            let secured = exchange(local, raw).await?;
            if secured.peer != expected {
                let actual = secured.peer;
                secured.close().await;
                return Err(GateError::PeerIdMismatch { expected, actual });
            }
            Ok(secured)
        })
    }

    fn secure_inbound(&self, raw: RawConnection) -> BoxFuture<'static, GateResult<SecuredConnection>> {
        let local = self.local;
        Box::pin(exchange(local, raw))
    }
}

async fn exchange(local: PeerId, raw: RawConnection) -> GateResult<SecuredConnection> {
    let RawConnection { mut io, addrs, kind } = raw;

    let hello = Exchange {
        protocol: PLAINTEXT_PROTOCOL.to_string(),
        peer_id: local.as_bytes().to_vec(),
    };
    write_frame(&mut io, &hello)
        .await
        .map_err(|e| GateError::Handshake(format!("sending exchange: {e}")))?;

    let remote: Exchange = read_frame(&mut io, MAX_EXCHANGE_FRAME)
        .await
        .map_err(|e| GateError::Handshake(format!("reading exchange: {e}")))?;

    if remote.protocol != PLAINTEXT_PROTOCOL {
        return Err(GateError::Handshake(format!(
            "unsupported security protocol: {}",
            remote.protocol
        )));
    }

    let bytes: [u8; 32] = remote
        .peer_id
        .as_slice()
        .try_into()
        .map_err(|_| GateError::Handshake(format!("invalid peer id length: {}", remote.peer_id.len())))?;
    let peer = PeerId::from_bytes(bytes);

    debug!(peer = %peer.short(), remote = %addrs.remote, "plaintext exchange complete");

    Ok(SecuredConnection {
        peer,
        io,
        addrs,
        kind,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::{ConnectedAddrs, TransportKind};
    use multiaddr::Multiaddr;

    fn raw_pair() -> (RawConnection, RawConnection) {
        let a: Multiaddr = "/ip4/127.0.0.1/tcp/1000".parse().unwrap();
        let b: Multiaddr = "/ip4/127.0.0.1/tcp/2000".parse().unwrap();
        let (x, y) = tokio::io::duplex(4096);
        (
            RawConnection {
                io: Box::new(x),
                addrs: ConnectedAddrs { local: a.clone(), remote: b.clone() },
                kind: TransportKind::Tcp,
            },
            RawConnection {
                io: Box::new(y),
                addrs: ConnectedAddrs { local: b, remote: a },
                kind: TransportKind::Tcp,
            },
        )
    }

    #[tokio::test]
    async fn both_sides_learn_the_remote_identity() {
        let dialer = PeerId::random();
        let listener = PeerId::random();
        let (out_raw, in_raw) = raw_pair();

        let outbound = PlaintextUpgrader::new(dialer).secure_outbound(out_raw, listener);
        let inbound = PlaintextUpgrader::new(listener).secure_inbound(in_raw);
        let (out, inn) = tokio::join!(outbound, inbound);

        assert_eq!(out.unwrap().peer, listener);
        assert_eq!(inn.unwrap().peer, dialer);
    }

    #[tokio::test]
    async fn outbound_rejects_unexpected_peer() {
        let (out_raw, in_raw) = raw_pair();
        let expected = PeerId::random();
        let impostor = PeerId::random();

        let outbound = PlaintextUpgrader::new(PeerId::random()).secure_outbound(out_raw, expected);
        let inbound = PlaintextUpgrader::new(impostor).secure_inbound(in_raw);
        let (out, _) = tokio::join!(outbound, inbound);

        match out {
            Err(GateError::PeerIdMismatch { expected: e, actual }) => {
                assert_eq!(e, expected);
                assert_eq!(actual, impostor);
            }
            other => panic!("expected PeerIdMismatch, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn closed_remote_fails_the_handshake() {
        let (out_raw, in_raw) = raw_pair();
        drop(in_raw);
        let result = PlaintextUpgrader::new(PeerId::random())
            .secure_outbound(out_raw, PeerId::random())
            .await;
        assert!(matches!(result, Err(GateError::Handshake(_))));
    }
}
