//! Host configuration: TOML file with per-field defaults.
//!
//! ```toml
//! [dial]
//! timeout_ms = 15000
//! per_addr_timeout_ms = 5000
//! handshake_timeout_ms = 5000
//! max_parallel_dials = 8
//!
//! [listen]
//! addrs = ["/ip4/127.0.0.1/tcp/0", "/ip4/127.0.0.1/udp/0/quic-v1"]
//! event_buffer = 256
//! ```

use gatehouse_core::{GateError, GateResult, Multiaddr};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Top-level config file structure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub dial: DialSection,
    #[serde(default)]
    pub listen: ListenSection,
}

/// `[dial]` section of the config TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct DialSection {
    #[serde(default = "default_dial_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_per_addr_timeout_ms")]
    pub per_addr_timeout_ms: u64,
    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,
    #[serde(default = "default_max_parallel_dials")]
    pub max_parallel_dials: usize,
}

impl Default for DialSection {
    fn default() -> Self {
        Self {
            timeout_ms: default_dial_timeout_ms(),
            per_addr_timeout_ms: default_per_addr_timeout_ms(),
            handshake_timeout_ms: default_handshake_timeout_ms(),
            max_parallel_dials: default_max_parallel_dials(),
        }
    }
}

/// `[listen]` section of the config TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct ListenSection {
    #[serde(default)]
    pub addrs: Vec<String>,
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

impl Default for ListenSection {
    fn default() -> Self {
        Self {
            addrs: Vec::new(),
            event_buffer: default_event_buffer(),
        }
    }
}

fn default_dial_timeout_ms() -> u64 {
    15_000
}
fn default_per_addr_timeout_ms() -> u64 {
    5_000
}
fn default_handshake_timeout_ms() -> u64 {
    5_000
}
fn default_max_parallel_dials() -> usize {
    8
}
fn default_event_buffer() -> usize {
    256
}

/// Resolved host configuration (addresses parsed, limits validated).
#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Upper bound on a whole dial, all addresses included.
    pub dial_timeout: Duration,
    /// Upper bound on a single transport connect.
    pub per_addr_timeout: Duration,
    /// Upper bound on the security handshake, both directions.
    pub handshake_timeout: Duration,
    /// Addresses raced at once for one dial.
    pub max_parallel_dials: usize,
    /// Addresses to bind on [`Host::start_listening`](crate::Host::start_listening).
    pub listen_addrs: Vec<Multiaddr>,
    /// Capacity of the host event channel.
    pub event_buffer: usize,
}

impl Default for HostConfig {
    fn default() -> Self {
        let dial = DialSection::default();
        Self {
            dial_timeout: Duration::from_millis(dial.timeout_ms),
            per_addr_timeout: Duration::from_millis(dial.per_addr_timeout_ms),
            handshake_timeout: Duration::from_millis(dial.handshake_timeout_ms),
            max_parallel_dials: dial.max_parallel_dials,
            listen_addrs: Vec::new(),
            event_buffer: default_event_buffer(),
        }
    }
}

impl HostConfig {
    /// Load config from a TOML file. A missing file yields the defaults.
    pub fn load(config_path: Option<&Path>) -> GateResult<Self> {
        let Some(path) = config_path else {
            return Ok(Self::default());
        };

        let expanded = expand_tilde(path);
        if !expanded.exists() {
            info!(path = %expanded.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }

        info!(path = %expanded.display(), "loading config file");
        let content = std::fs::read_to_string(&expanded)?;
        Self::from_toml_str(&content)
    }

    /// Parse config from TOML text.
    pub fn from_toml_str(content: &str) -> GateResult<Self> {
        let file = toml::from_str::<ConfigFile>(content)
            .map_err(|e| GateError::Config(format!("config parse error: {e}")))?;
        Self::from_file(file)
    }

    fn from_file(file: ConfigFile) -> GateResult<Self> {
        if file.dial.max_parallel_dials == 0 {
            return Err(GateError::Config("dial.max_parallel_dials must be at least 1".into()));
        }
        if file.listen.event_buffer == 0 {
            return Err(GateError::Config("listen.event_buffer must be at least 1".into()));
        }

        let listen_addrs = file
            .listen
            .addrs
            .iter()
            .map(|s| {
                s.parse::<Multiaddr>()
                    .map_err(|e| GateError::Config(format!("invalid listen address {s}: {e}")))
            })
            .collect::<GateResult<Vec<_>>>()?;

        Ok(Self {
            dial_timeout: Duration::from_millis(file.dial.timeout_ms),
            per_addr_timeout: Duration::from_millis(file.dial.per_addr_timeout_ms),
            handshake_timeout: Duration::from_millis(file.dial.handshake_timeout_ms),
            max_parallel_dials: file.dial.max_parallel_dials,
            listen_addrs,
            event_buffer: file.listen.event_buffer,
        })
    }
}

/// Expand `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    if let Some(rest) = s.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}
