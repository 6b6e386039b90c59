// Error types for the relay server and client.
//
// Only startup problems surface as `RelayError`: a failed bind or an
// unreadable config file. Per-connection I/O failures never leave the
// connection's handler thread. They end that session (see `server.rs`).

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Fatal errors from starting a relay.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to read config {}: {source}", path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid config {}: {source}", path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors from `ChatClient`.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("connect to {addr} failed: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("connection I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("connection is closed")]
    Closed,
}
