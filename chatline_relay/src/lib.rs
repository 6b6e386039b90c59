// chatline_relay: multi-client chat relay and client library.
//
// The relay accepts TCP connections and takes each client's first line as
// its nickname. It then routes every later line by a small command grammar:
// broadcast chat, private whispers, emoji reactions, typing signals, friend
// lookups, and a history-clear signal. See `chatline_protocol` for the wire
// vocabulary.
//
// Module overview:
// - `session.rs`:   One connected peer: nickname, write half, liveness.
// - `registry.rs`:  Live sessions and claimed nicknames; lookup, targeted
//                   send and broadcast that tolerates write failures.
// - `reactions.rs`: Per-message emoji reactions with set semantics. Used
//                   by both the relay and the client.
// - `router.rs`:    Join/leave announcements and per-line command dispatch.
//                   The core data structure that `server.rs` drives.
// - `server.rs`:    TCP listener, one handler thread per connection, and
//                   the coordinator loop that owns the `Router`.
// - `client.rs`:    `ChatClient`, the API a chat front end builds on.
// - `typing.rs`:    Client-side typing indicator with per-sender
//                   cancel-and-restart timeouts.
// - `config.rs`:    `RelayConfig` defaults and JSON loading.
// - `error.rs`:     `RelayError` and `ClientError`.
//
// The relay can run as a standalone binary (`main.rs`) or be embedded in
// another process via the library API (`start_relay`).

pub mod client;
pub mod config;
pub mod error;
pub mod reactions;
pub mod registry;
pub mod router;
pub mod server;
pub mod session;
pub mod typing;

#[cfg(test)]
mod testing;

pub use client::{ChatClient, ClientHandlers};
pub use config::RelayConfig;
pub use error::{ClientError, RelayError};
pub use server::{RelayHandle, start_relay};
