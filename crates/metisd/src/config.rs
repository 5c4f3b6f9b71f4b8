//! `metisd`'s startup configuration: static listeners to bring up and
//! forwarding defaults (spec.md §6's ambient config layer), mirroring the
//! teacher's `reticulumd::config::DaemonConfig` `from_toml`/`from_path`
//! shape. Nothing about FIB routes lives here — spec.md §6 "Configuration
//! is applied via the control channel," so routes are added at runtime,
//! never read from this file.

use std::fs;
use std::path::Path;

use serde::Deserialize;

/// Default port for data listeners brought up at startup (spec.md §6,
/// "Default port 9695 (TCP and UDP) for control and data"). The control
/// channel itself is served on its own local socket (see
/// [`ForwarderConfig::control_socket`]) rather than this port: a
/// line-oriented control grammar and the binary TLV wire format can't
/// share one stream without a framing conflict, so this build resolves
/// that ambiguity by keeping them separate (documented in DESIGN.md).
pub const DEFAULT_DATA_PORT: u16 = 9695;

#[derive(Debug, Deserialize)]
pub struct ForwarderConfig {
    #[serde(default)]
    pub listeners: Vec<ListenerConfig>,
    #[serde(default)]
    pub forwarding: ForwardingConfig,
    #[serde(default = "default_control_socket")]
    pub control_socket: String,
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self { listeners: Vec::new(), forwarding: ForwardingConfig::default(), control_socket: default_control_socket() }
    }
}

fn default_control_socket() -> String {
    "/run/metisd.sock".to_string()
}

#[derive(Debug, Deserialize)]
pub struct ListenerConfig {
    #[serde(rename = "type")]
    pub kind: String,
    pub symbolic: String,
    #[serde(default)]
    pub enabled: bool,
    pub addr: Option<String>,
    pub port: Option<u16>,
    pub ifname: Option<String>,
    #[serde(default)]
    pub is_local: bool,
}

#[derive(Debug, Deserialize)]
pub struct ForwardingConfig {
    #[serde(default = "default_content_store_capacity")]
    pub content_store_capacity: usize,
    #[serde(default = "default_interest_lifetime_ms")]
    pub default_interest_lifetime_ms: u64,
    #[serde(default = "default_max_interest_lifetime_ms")]
    pub max_interest_lifetime_ms: u64,
    #[serde(default = "default_connection_outbox_capacity")]
    pub connection_outbox_capacity: usize,
    #[serde(default = "default_true")]
    pub cache_serve: bool,
    #[serde(default = "default_true")]
    pub cache_store: bool,
    #[serde(default = "default_tick_duration_ms")]
    pub tick_duration_ms: u64,
    #[serde(default = "default_keepalive_threshold_ms")]
    pub keepalive_threshold_ms: u64,
}

impl Default for ForwardingConfig {
    fn default() -> Self {
        Self {
            content_store_capacity: default_content_store_capacity(),
            default_interest_lifetime_ms: default_interest_lifetime_ms(),
            max_interest_lifetime_ms: default_max_interest_lifetime_ms(),
            connection_outbox_capacity: default_connection_outbox_capacity(),
            cache_serve: true,
            cache_store: true,
            tick_duration_ms: default_tick_duration_ms(),
            keepalive_threshold_ms: default_keepalive_threshold_ms(),
        }
    }
}

fn default_content_store_capacity() -> usize {
    65536
}

fn default_interest_lifetime_ms() -> u64 {
    4_000
}

fn default_max_interest_lifetime_ms() -> u64 {
    60_000
}

fn default_connection_outbox_capacity() -> usize {
    256
}

fn default_tick_duration_ms() -> u64 {
    1
}

fn default_keepalive_threshold_ms() -> u64 {
    30_000
}

fn default_true() -> bool {
    true
}

impl ForwarderConfig {
    pub fn from_toml(input: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(input)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, std::io::Error> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents).map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))
    }

    pub fn enabled_listeners(&self) -> impl Iterator<Item = &ListenerConfig> {
        self.listeners.iter().filter(|l| l.enabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_falls_back_to_defaults() {
        let config = ForwarderConfig::from_toml("").unwrap();
        assert!(config.listeners.is_empty());
        assert_eq!(config.forwarding.content_store_capacity, 65536);
        assert!(config.forwarding.cache_serve);
        assert_eq!(config.control_socket, "/run/metisd.sock");
    }

    #[test]
    fn parses_a_listener_table() {
        let toml = r#"
            control_socket = "/tmp/metisd-test.sock"

            [[listeners]]
            type = "tcp"
            symbolic = "eth0"
            enabled = true
            addr = "0.0.0.0"
            port = 9695

            [forwarding]
            cache_serve = false
        "#;
        let config = ForwarderConfig::from_toml(toml).unwrap();
        assert_eq!(config.control_socket, "/tmp/metisd-test.sock");
        assert_eq!(config.enabled_listeners().count(), 1);
        assert!(!config.forwarding.cache_serve);
        assert!(config.forwarding.cache_store);
    }
}
