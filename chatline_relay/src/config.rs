// Relay configuration.
//
// `RelayConfig` has three layers. Built-in defaults come first. An optional
// JSON file overrides them; any field it leaves out keeps its default. CLI
// flags in `main.rs` override both. Port 0 asks the OS for a free port, which
// is how the tests run relays side by side.

use std::fs;
use std::path::Path;
use std::time::Duration;

use chatline_protocol::DEFAULT_MAX_LINE_BYTES;
use serde::{Deserialize, Serialize};

use crate::error::RelayError;

/// Default listen port.
pub const DEFAULT_PORT: u16 = 5555;

/// Configuration for starting a relay server.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Interface to bind.
    pub host: String,
    pub port: u16,
    /// Longest inbound line accepted before the connection is dropped.
    pub max_line_bytes: usize,
    /// How long one outbound write may block before that session is dropped.
    /// `None` (or 0) waits forever.
    pub write_timeout_secs: Option<u64>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: DEFAULT_PORT,
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
            write_timeout_secs: Some(10),
        }
    }
}

impl RelayConfig {
    /// Load a config from a JSON file. Missing fields take their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self, RelayError> {
        let text = fs::read_to_string(path).map_err(|source| RelayError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| RelayError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// `host:port` string passed to `TcpListener::bind`.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn write_timeout(&self) -> Option<Duration> {
        self.write_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}
