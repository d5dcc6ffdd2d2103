use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::net::{Ipv4Addr, SocketAddr};
use std::str::FromStr;

/// Well-known UDP port for discovery datagrams.
pub const DEFAULT_DISCOVERY_PORT: u16 = 33034;
/// Multicast group joined in addition to subnet broadcast.
pub const DEFAULT_MULTICAST_GROUP: Ipv4Addr = Ipv4Addr::new(239, 77, 83, 75);

#[derive(Debug)]
pub enum ConfigError {
    Read { path: String, reason: String },
    InvalidValue {
        section: String,
        key: String,
        value: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read { path, reason } => write!(f, "error reading config {path}: {reason}"),
            Self::InvalidValue {
                section,
                key,
                value,
            } => write!(f, "invalid value {value:?} for [{section}] {key}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Raw INI-style configuration: `[Section]` headers, `key = value` lines,
/// `#` comments, optional double quotes around values. Keys before the first
/// header are globals.
#[derive(Debug, Default)]
pub struct Config {
    globals: HashMap<String, String>,
    sections: HashMap<String, HashMap<String, String>>,
}

impl Config {
    /// # Errors
    /// Returns [`ConfigError::Read`] if the file cannot be read.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_owned(),
            reason: e.to_string(),
        })?;
        Ok(Self::parse(&content))
    }

    #[must_use]
    pub fn parse(content: &str) -> Self {
        let mut cfg = Self::default();
        let mut current: Option<String> = None;

        for raw in content.lines() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                current = Some(name.trim().to_owned());
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let key = key.trim().to_owned();
            let value = value.trim().trim_matches('"').to_owned();
            match &current {
                None => {
                    cfg.globals.insert(key, value);
                }
                Some(sec) => {
                    cfg.sections
                        .entry(sec.clone())
                        .or_default()
                        .insert(key, value);
                }
            }
        }
        cfg
    }

    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Section value, ignoring empty strings.
    #[must_use]
    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.sections
            .get(section)
            .and_then(|sec| sec.get(key))
            .map(String::as_str)
            .filter(|s| !s.is_empty())
    }

    #[must_use]
    pub fn get_global(&self, key: &str) -> Option<&str> {
        self.globals.get(key).map(String::as_str)
    }

    /// Parse `[section] key` as `T`, falling back to `default` when absent.
    ///
    /// # Errors
    /// Returns [`ConfigError::InvalidValue`] if the value is present but does
    /// not parse.
    pub fn parse_or<T: FromStr>(&self, section: &str, key: &str, default: T) -> Result<T, ConfigError> {
        match self.get(section, key) {
            None => Ok(default),
            Some(raw) => raw.parse::<T>().map_err(|_| ConfigError::InvalidValue {
                section: section.to_owned(),
                key: key.to_owned(),
                value: raw.to_owned(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryConfig {
    pub port: u16,
    pub multicast_group: Ipv4Addr,
    pub heartbeat_ms: u64,
    pub liveness_ms: u64,
    /// Also send to 255.255.255.255 (same-subnet fallback).
    pub broadcast: bool,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_DISCOVERY_PORT,
            multicast_group: DEFAULT_MULTICAST_GROUP,
            heartbeat_ms: 5_000,
            liveness_ms: 15_000,
            broadcast: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Port 0 picks an ephemeral port, advertised as `wsPort`.
    pub listen_addr: SocketAddr,
    pub connect_timeout_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 0)),
            connect_timeout_ms: 3_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalingConfig {
    pub max_envelope_bytes: usize,
    pub rate_limit_count: usize,
    pub rate_limit_window_ms: u64,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            max_envelope_bytes: 64 * 1024,
            rate_limit_count: 30,
            rate_limit_window_ms: 60_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioSettings {
    pub sample_rate: u32,
    pub channels: u16,
    pub frame_ms: u32,
    pub jitter_target_ms: u32,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            channels: 1,
            frame_ms: 20,
            jitter_target_ms: 60,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoggingConfig {
    pub path: Option<String>,
    pub filename: Option<String>,
    pub echo_stderr: bool,
}

/// Typed settings for one running peer service.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceConfig {
    pub discovery: DiscoveryConfig,
    pub connections: ConnectionConfig,
    pub signaling: SignalingConfig,
    pub audio: AudioSettings,
    pub logging: LoggingConfig,
    /// `None` generates a random `SKP-NNNNN` number at start.
    pub dialable_number: Option<String>,
}

impl ServiceConfig {
    /// # Errors
    /// Propagates the first [`ConfigError::InvalidValue`].
    pub fn from_config(cfg: &Config) -> Result<Self, ConfigError> {
        let d = DiscoveryConfig::default();
        let c = ConnectionConfig::default();
        let s = SignalingConfig::default();
        let a = AudioSettings::default();

        Ok(Self {
            discovery: DiscoveryConfig {
                port: cfg.parse_or("Discovery", "port", d.port)?,
                multicast_group: cfg.parse_or("Discovery", "multicast_group", d.multicast_group)?,
                heartbeat_ms: cfg.parse_or("Discovery", "heartbeat_ms", d.heartbeat_ms)?,
                liveness_ms: cfg.parse_or("Discovery", "liveness_ms", d.liveness_ms)?,
                broadcast: cfg.parse_or("Discovery", "broadcast", d.broadcast)?,
            },
            connections: ConnectionConfig {
                listen_addr: cfg.parse_or("Connections", "listen_addr", c.listen_addr)?,
                connect_timeout_ms: cfg.parse_or(
                    "Connections",
                    "connect_timeout_ms",
                    c.connect_timeout_ms,
                )?,
            },
            signaling: SignalingConfig {
                max_envelope_bytes: cfg.parse_or(
                    "Signaling",
                    "max_envelope_bytes",
                    s.max_envelope_bytes,
                )?,
                rate_limit_count: cfg.parse_or("Signaling", "rate_limit_count", s.rate_limit_count)?,
                rate_limit_window_ms: cfg.parse_or(
                    "Signaling",
                    "rate_limit_window_ms",
                    s.rate_limit_window_ms,
                )?,
            },
            audio: AudioSettings {
                sample_rate: cfg.parse_or("Audio", "sample_rate", a.sample_rate)?,
                channels: cfg.parse_or("Audio", "channels", a.channels)?,
                frame_ms: cfg.parse_or("Audio", "frame_ms", a.frame_ms)?,
                jitter_target_ms: cfg.parse_or("Audio", "jitter_target_ms", a.jitter_target_ms)?,
            },
            logging: LoggingConfig {
                path: cfg.get("Logging", "path").map(str::to_owned),
                filename: cfg.get("Logging", "filename").map(str::to_owned),
                echo_stderr: cfg.parse_or("Logging", "echo_stderr", false)?,
            },
            dialable_number: cfg.get("Account", "dialable_number").map(str::to_owned),
        })
    }
}
