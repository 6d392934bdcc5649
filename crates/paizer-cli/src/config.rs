//! Layered launcher settings: built-in defaults, then an optional TOML
//! file, then command-line flags.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use paizer::RelayConfig;
use serde::Deserialize;

use crate::cli::Cli;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_STREAM_PORT: u16 = 32768;
pub const DEFAULT_WEBSOCKET_PORT: u16 = 32769;

/// Contents of the `--config` file. Every field is optional.
///
/// ```toml
/// host = "0.0.0.0"
/// port = 32768
/// ws_port = 32769
///
/// [relay]
/// sweep_interval_ms = 5000
/// stale_after_ms = 10000
/// probe_interval_ms = 5000
/// idle_timeout_ms = 10000
/// handshake_timeout_ms = 30000
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub ws_port: Option<u16>,
    pub websocket: Option<bool>,
    pub relay: RelayFileConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RelayFileConfig {
    pub sweep_interval_ms: Option<u64>,
    pub stale_after_ms: Option<u64>,
    pub probe_interval_ms: Option<u64>,
    pub idle_timeout_ms: Option<u64>,
    pub handshake_timeout_ms: Option<u64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config at {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Failed to parse config at {}", path.display()))
    }

    fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}

impl RelayFileConfig {
    /// Overrides the fields that are set in the file.
    fn apply(&self, mut config: RelayConfig) -> RelayConfig {
        let ms = Duration::from_millis;
        if let Some(v) = self.sweep_interval_ms {
            config.sweep_interval = ms(v);
        }
        if let Some(v) = self.stale_after_ms {
            config.stale_after = ms(v);
        }
        if let Some(v) = self.probe_interval_ms {
            config.probe_interval = ms(v);
        }
        if let Some(v) = self.idle_timeout_ms {
            config.idle_timeout = ms(v);
        }
        if let Some(v) = self.handshake_timeout_ms {
            config.handshake_timeout = ms(v);
        }
        config
    }
}

/// Fully resolved launcher settings.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub stream_addr: String,
    pub websocket_addr: Option<String>,
    pub relay: RelayConfig,
}

impl Settings {
    /// Reads the config file named by `--config`, if any, and resolves.
    pub fn load(cli: &Cli) -> Result<Self> {
        let file = match &cli.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };
        Ok(Self::resolve(cli, file))
    }

    /// Flags win over the file, the file wins over defaults.
    pub fn resolve(cli: &Cli, file: FileConfig) -> Self {
        let host = cli
            .host
            .clone()
            .or(file.host)
            .unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = cli.port.or(file.port).unwrap_or(DEFAULT_STREAM_PORT);
        let ws_port = cli.ws_port.or(file.ws_port).unwrap_or(DEFAULT_WEBSOCKET_PORT);
        let websocket = !cli.no_websocket && file.websocket.unwrap_or(true);

        Self {
            stream_addr: join_host_port(&host, port),
            websocket_addr: websocket.then(|| join_host_port(&host, ws_port)),
            relay: file.relay.apply(RelayConfig::default()),
        }
    }
}

/// `host:port`, bracketing bare IPv6 hosts.
fn join_host_port(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}
