//! gatehouse: connection gating simulator.
//!
//! Runs a dialing host and a listening host over an in-process network and
//! reports how a gater configured from flags treats the attempt.

mod commands;

use clap::{Parser, Subcommand};
use gatehouse_host::HostConfig;
use std::path::Path;
use tracing::error;

/// gatehouse: connection gating simulator
#[derive(Parser)]
#[command(name = "gatehouse", version, about = "Simulate the connection gating pipeline of a p2p host")]
struct Cli {
    /// Config file path
    #[arg(long = "config", global = true, default_value = "~/.gatehouse/config.toml")]
    config: String,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Dial a listening host through a flag-configured gater
    Simulate(commands::simulate::SimulateArgs),

    /// Show which transport handles each address
    Transports {
        /// Addresses to classify
        #[arg(required = true)]
        addrs: Vec<String>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing.
    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("gatehouse=debug,gatehouse_cli=debug,gatehouse_host=debug,gatehouse_core=debug")
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter("gatehouse=warn,gatehouse_cli=warn")
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    let result = match cli.command {
        Command::Simulate(args) => match HostConfig::load(Some(Path::new(&cli.config))) {
            Ok(config) => commands::simulate::run(args, config).await,
            Err(e) => Err(anyhow::Error::new(e).context("failed to load config")),
        },
        Command::Transports { addrs, json } => commands::transports::run(&addrs, json),
    };

    if let Err(e) = result {
        error!("{:#}", e);
        eprintln!("gatehouse: {e:#}");
        std::process::exit(1);
    }
}
