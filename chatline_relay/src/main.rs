// CLI entry point for the chatline relay.
//
// Starts a standalone relay server that chat clients connect to. Logging
// goes through `env_logger` (default level `info`, override with RUST_LOG).
// Ctrl+C stops the relay cleanly, closing every client connection.
//
// Usage:
//   chatline-relay [OPTIONS]
//     --config <PATH>           JSON config file (fields as in `RelayConfig`)
//     --host <HOST>             Interface to bind (default: 0.0.0.0)
//     -p, --port <PORT>         Listen port (default: 5555)
//     --max-line-bytes <N>      Longest accepted inbound line
//     --write-timeout-secs <N>  Drop a client whose write blocks this long (0: never)

use std::path::PathBuf;
use std::sync::mpsc;

use anyhow::{Context, Result};
use chatline_relay::{RelayConfig, start_relay};
use clap::Parser;
use log::info;

#[derive(Debug, Parser)]
#[command(name = "chatline-relay", version, about = "Multi-client chat relay")]
struct Cli {
    /// JSON config file; flags below override its fields.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Interface to bind.
    #[arg(long)]
    host: Option<String>,

    /// Listen port.
    #[arg(short, long)]
    port: Option<u16>,

    /// Longest accepted inbound line, in bytes.
    #[arg(long)]
    max_line_bytes: Option<usize>,

    /// Seconds a write to one client may block before it is dropped (0: never).
    #[arg(long)]
    write_timeout_secs: Option<u64>,
}

impl Cli {
    fn into_config(self) -> Result<RelayConfig> {
        let mut config = match &self.config {
            Some(path) => RelayConfig::from_json_file(path)?,
            None => RelayConfig::default(),
        };
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(max_line_bytes) = self.max_line_bytes {
            config.max_line_bytes = max_line_bytes;
        }
        if let Some(secs) = self.write_timeout_secs {
            config.write_timeout_secs = Some(secs);
        }
        Ok(config)
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    let config = Cli::parse().into_config()?;
    let (handle, addr) = start_relay(config).context("failed to start relay")?;
    println!("Relay listening on {addr}");
    println!("Press Ctrl+C to stop.");

    let (stop_tx, stop_rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = stop_tx.send(());
    })
    .context("failed to install Ctrl+C handler")?;
    // An error here means the handler was dropped; stop either way.
    let _ = stop_rx.recv();

    info!("shutting down");
    handle.stop();
    Ok(())
}
