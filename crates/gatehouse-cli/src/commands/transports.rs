//! `gatehouse transports`: classify addresses by transport.

use anyhow::Result;
use gatehouse_core::{Multiaddr, TransportKind};
use serde::Serialize;

#[derive(Debug, Serialize)]
struct Classified {
    addr: String,
    /// `None` when the address does not parse or no transport handles it.
    transport: Option<TransportKind>,
    error: Option<String>,
}

fn classify(addr: &str) -> Classified {
    match addr.parse::<Multiaddr>() {
        Ok(parsed) => {
            let transport = TransportKind::detect(&parsed);
            Classified {
                addr: addr.to_string(),
                transport,
                error: transport.is_none().then(|| "unsupported transport".to_string()),
            }
        }
        Err(e) => Classified {
            addr: addr.to_string(),
            transport: None,
            error: Some(format!("invalid address: {e}")),
        },
    }
}

pub fn run(addrs: &[String], json: bool) -> Result<()> {
    let rows: Vec<Classified> = addrs.iter().map(|a| classify(a)).collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    println!("{:<48} {}", "ADDRESS", "TRANSPORT");
    println!("{:<48} {}", "\u{2500}".repeat(7), "\u{2500}".repeat(9));
    for row in &rows {
        let transport = match (&row.transport, &row.error) {
            (Some(kind), _) => kind.to_string(),
            (None, Some(e)) => format!("- ({e})"),
            (None, None) => "-".to_string(),
        };
        println!("{:<48} {}", row.addr, transport);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_known_and_unknown_addresses() {
        assert_eq!(classify("/ip4/1.2.3.4/tcp/80/ws").transport, Some(TransportKind::WebSocket));

        let unsupported = classify("/ip4/1.2.3.4/udp/80");
        assert_eq!(unsupported.transport, None);
        assert_eq!(unsupported.error.as_deref(), Some("unsupported transport"));

        let garbage = classify("not-an-address");
        assert!(garbage.error.unwrap().starts_with("invalid address"));
    }
}
