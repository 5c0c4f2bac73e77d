//! CLI subcommand implementations.

pub mod simulate;
pub mod transports;
