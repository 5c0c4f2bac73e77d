//! `gatehouse simulate`: dial a listening host through a gater built from flags.
//!
//! Both hosts live on one in-memory network, so every transport kind can be
//! exercised without sockets. The report lists each candidate address, the
//! checkpoints the gater saw, the outcome, and the dialer's gate counters.

use anyhow::{Context, Result};
use clap::Args;
use gatehouse_core::{DisconnectReason, ErrorClass, GateError, Multiaddr, PeerId, TransportKind};
use gatehouse_host::{Checkpoint, GateStatsSnapshot, Host, HostConfig, MemoryNetwork, RecordingGater};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

/// Listen addresses used when neither flags nor config name any.
const DEFAULT_ADDRS: [&str; 5] = [
    "/ip4/127.0.0.1/tcp/0",
    "/ip4/127.0.0.1/tcp/0/ws",
    "/ip4/127.0.0.1/udp/0/quic",
    "/ip4/127.0.0.1/udp/0/quic-v1",
    "/ip4/127.0.0.1/udp/0/quic-v1/webtransport",
];

#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Address for the remote host to listen on (repeatable)
    #[arg(long = "addr")]
    addrs: Vec<String>,

    /// Deny the dial at the peer checkpoint
    #[arg(long)]
    deny_peer: bool,

    /// Deny every address of this transport kind (repeatable)
    #[arg(long = "deny-transport", value_name = "KIND")]
    deny_transports: Vec<TransportKind>,

    /// Deny after the security handshake
    #[arg(long)]
    deny_secured: bool,

    /// Deny the upgraded connection with this reason code
    #[arg(long, value_name = "REASON")]
    deny_upgraded: Option<u32>,

    /// Print JSON instead of a table
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Serialize)]
struct Candidate {
    addr: String,
    transport: Option<TransportKind>,
    dialed: bool,
}

#[derive(Debug, Serialize)]
struct Outcome {
    /// `connected`, or the class of the failure.
    status: String,
    transport: Option<TransportKind>,
    remote_addr: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct Report {
    local_peer: String,
    remote_peer: String,
    candidates: Vec<Candidate>,
    checkpoints: Vec<Checkpoint>,
    outcome: Outcome,
    stats: GateStatsSnapshot,
}

fn build_gater(args: &SimulateArgs) -> RecordingGater {
    let denied = args.deny_transports.clone();
    let mut gater = RecordingGater::allow_all()
        .addr_dial_with(move |_, addr| TransportKind::detect(addr).map_or(true, |kind| !denied.contains(&kind)));
    if args.deny_peer {
        gater = gater.deny_peer_dial();
    }
    if args.deny_secured {
        gater = gater.deny_secured();
    }
    if let Some(code) = args.deny_upgraded {
        gater = gater.deny_upgraded(Some(DisconnectReason(code)));
    }
    gater
}

fn listen_addrs(args: &SimulateArgs, config: &HostConfig) -> Result<Vec<Multiaddr>> {
    if !args.addrs.is_empty() {
        return args
            .addrs
            .iter()
            .map(|a| a.parse::<Multiaddr>().with_context(|| format!("invalid address: {a}")))
            .collect();
    }
    if !config.listen_addrs.is_empty() {
        return Ok(config.listen_addrs.clone());
    }
    DEFAULT_ADDRS
        .iter()
        .map(|a| a.parse::<Multiaddr>().with_context(|| format!("invalid address: {a}")))
        .collect()
}

fn status_of(e: &GateError) -> &'static str {
    match e.class() {
        ErrorClass::PolicyDenied => "policy_denied",
        ErrorClass::NoCandidates => "no_candidates",
        ErrorClass::Transport => "transport",
        ErrorClass::Configuration => "configuration",
    }
}

/// Run the simulation and print its report.
pub async fn run(args: SimulateArgs, config: HostConfig) -> Result<()> {
    let network = MemoryNetwork::new();

    let remote = Host::builder(PeerId::random())
        .transport(network.transport())
        .config(config.clone())
        .build()
        .context("failed to build remote host")?;
    let mut bound = Vec::new();
    for addr in listen_addrs(&args, &config)? {
        let addr = remote
            .listen(addr.clone())
            .await
            .with_context(|| format!("failed to listen on {addr}"))?;
        bound.push(addr);
    }
    debug!(addrs = ?bound, "remote host listening");

    let gater = Arc::new(build_gater(&args));
    let local = Host::builder(PeerId::random())
        .gater(gater.clone())
        .transport(network.transport())
        .config(config)
        .build()
        .context("failed to build local host")?;

    let result = local.dial(remote.local_peer(), bound.clone()).await;
    let outcome = match &result {
        Ok(conn) => {
            info!(conn = %conn.id(), transport = %conn.transport(), "simulated dial connected");
            Outcome {
                status: "connected".to_string(),
                transport: Some(conn.transport()),
                remote_addr: Some(conn.remote_addr().to_string()),
                error: None,
            }
        }
        Err(e) => Outcome {
            status: status_of(e).to_string(),
            transport: None,
            remote_addr: None,
            error: Some(e.to_string()),
        },
    };

    let dialed = network.dial_log();
    let report = Report {
        local_peer: local.local_peer().to_string(),
        remote_peer: remote.local_peer().to_string(),
        candidates: bound
            .iter()
            .map(|addr| Candidate {
                addr: addr.to_string(),
                transport: TransportKind::detect(addr),
                dialed: dialed.contains(addr),
            })
            .collect(),
        checkpoints: gater.checkpoints(),
        outcome,
        stats: local.stats(),
    };

    local.shutdown().await;
    remote.shutdown().await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_table(&report);
    }
    Ok(())
}

fn print_table(report: &Report) {
    println!("local  {}", report.local_peer);
    println!("remote {}\n", report.remote_peer);

    println!("{:<48} {:<14} {}", "ADDRESS", "TRANSPORT", "DIALED");
    println!("{:<48} {:<14} {}", "\u{2500}".repeat(7), "\u{2500}".repeat(9), "\u{2500}".repeat(6));
    for c in &report.candidates {
        let transport = c.transport.map_or_else(|| "-".to_string(), |k| k.to_string());
        println!("{:<48} {:<14} {}", c.addr, transport, if c.dialed { "yes" } else { "no" });
    }

    let trace: Vec<&str> = report.checkpoints.iter().map(Checkpoint::name).collect();
    println!("\ncheckpoints: {}", trace.join(" -> "));
    match &report.outcome.error {
        None => println!(
            "outcome:     connected via {} ({})",
            report.outcome.transport.map_or_else(|| "-".to_string(), |k| k.to_string()),
            report.outcome.remote_addr.as_deref().unwrap_or("-"),
        ),
        Some(e) => println!("outcome:     {} ({e})", report.outcome.status),
    }
    println!("stats:       {}", report.stats.summary());
}
