//! Proxy configuration.
//!
//! Loaded from a JSON file; every field has a default so a partial file (or
//! none at all) is valid.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read or written
    #[error("Config file {path:?}: {source}")]
    Io {
        /// File involved
        path: PathBuf,
        /// Underlying error
        source: io::Error,
    },

    /// Config file is not valid JSON for [`ProxyConfig`]
    #[error("Invalid config {path:?}: {source}")]
    Invalid {
        /// File involved
        path: PathBuf,
        /// Underlying error
        source: serde_json::Error,
    },

    /// Unknown transport name
    #[error("Unknown transport '{0}' (expected websocket or ndjson)")]
    Transport(String),
}

/// How the IDE and runtime sockets frame messages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// One text frame per message.
    #[default]
    WebSocket,
    /// One JSON document per line.
    Ndjson,
}

impl FromStr for TransportKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "websocket" | "ws" => Ok(TransportKind::WebSocket),
            "ndjson" => Ok(TransportKind::Ndjson),
            _ => Err(ConfigError::Transport(s.to_owned())),
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::WebSocket => f.write_str("websocket"),
            TransportKind::Ndjson => f.write_str("ndjson"),
        }
    }
}

/// Proxy configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Address the IDE connects to
    pub listen: SocketAddr,

    /// Debugging endpoint of the runtime (a `ws://` url for WebSocket, a
    /// `host:port` address for NDJSON)
    pub runtime_url: String,

    /// Directory that loaded-file urls are resolved against
    pub symbol_root: PathBuf,

    /// Framing used on both sockets
    pub transport: TransportKind,

    /// Tracing filter directives, used when `RUST_LOG` is unset
    pub log_filter: Option<String>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([127, 0, 0, 1], 9300)),
            runtime_url: "ws://127.0.0.1:9222/devtools/page".into(),
            symbol_root: PathBuf::from("."),
            transport: TransportKind::default(),
            log_filter: None,
        }
    }
}

impl ProxyConfig {
    /// Load a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_slice(&data).map_err(|source| ConfigError::Invalid {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Write the configuration, replacing `path` atomically.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        let json = serde_json::to_vec_pretty(self).map_err(|source| ConfigError::Invalid {
            path: path.to_path_buf(),
            source,
        })?;
        let temp = path.with_extension("json.tmp");
        std::fs::write(&temp, json).map_err(io_err)?;
        std::fs::rename(&temp, path).map_err(io_err)
    }
}
