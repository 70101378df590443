//! Configuration system for Otela.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $OTELA_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/otela/config.toml
//!   3. ~/.config/otela/config.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Fallback tombstone retention when the config carries no value.
pub const DEFAULT_TOMBSTONE_RETENTION_SECS: u64 = 3600;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OtelaConfig {
    pub api: ApiConfig,
    pub p2p: P2pConfig,
    pub crdt: CrdtConfig,
    pub log: LogConfig,
    /// Services reachable on this node, forwarded via `/service/<name>/..`.
    #[serde(rename = "local_service")]
    pub local_services: Vec<LocalServiceConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// TCP port for the HTTP front door.
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct P2pConfig {
    /// TCP port the libp2p host listens on. 0 = OS-assigned.
    pub listen_port: u16,
    /// Address advertised to other peers (host only).
    pub public_address: String,
    /// Multiaddrs (with peer ids) dialed at startup.
    pub bootstrap_peers: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrdtConfig {
    /// How long a departed peer's record is retained before it is reaped
    /// from the replicated store. Minimum 1 second.
    pub tombstone_retention_secs: u64,
    /// Interval between tombstone sweeps.
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level filter: trace, debug, info, warn, error.
    pub level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalServiceConfig {
    pub name: String,
    pub host: String,
    pub port: u16,
    /// Identity tags advertised with this service: `key=value`, `key=*`,
    /// or `all`.
    #[serde(default)]
    pub identity_group: Vec<String>,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for OtelaConfig {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            p2p: P2pConfig::default(),
            crdt: CrdtConfig::default(),
            log: LogConfig::default(),
            local_services: Vec::new(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self { port: 8080 }
    }
}

impl Default for P2pConfig {
    fn default() -> Self {
        Self {
            listen_port: 0,
            public_address: String::new(),
            bootstrap_peers: Vec::new(),
        }
    }
}

impl Default for CrdtConfig {
    fn default() -> Self {
        Self {
            tombstone_retention_secs: DEFAULT_TOMBSTONE_RETENTION_SECS,
            sweep_interval_secs: 60,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("otela")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl OtelaConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?
        } else {
            OtelaConfig::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("OTELA_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&OtelaConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text)
                .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Apply OTELA_* env var overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("OTELA_API__PORT") {
            if let Ok(p) = v.parse() {
                self.api.port = p;
            }
        }
        if let Ok(v) = std::env::var("OTELA_P2P__LISTEN_PORT") {
            if let Ok(p) = v.parse() {
                self.p2p.listen_port = p;
            }
        }
        if let Ok(v) = std::env::var("OTELA_P2P__PUBLIC_ADDRESS") {
            self.p2p.public_address = v;
        }
        if let Ok(v) = std::env::var("OTELA_CRDT__TOMBSTONE_RETENTION_SECS") {
            if let Ok(secs) = v.parse() {
                self.crdt.tombstone_retention_secs = secs;
            }
        }
        if let Ok(v) = std::env::var("OTELA_CRDT__SWEEP_INTERVAL_SECS") {
            if let Ok(secs) = v.parse() {
                self.crdt.sweep_interval_secs = secs;
            }
        }
        if let Ok(v) = std::env::var("OTELA_LOG__LEVEL") {
            self.log.level = v;
        }
    }
}
