// Test-only chat client for end-to-end relay tests.
//
// Wraps the real `ChatClient` (from `chatline_relay::client`) and funnels
// both of its callbacks into one `mpsc` channel. Inbound lines and user-list
// updates then come out in the order the relay sent them. On top of that it
// provides a synchronous, test-friendly API: blocking waits with a timeout,
// plus a "quiesce" drain used to assert that something did *not* arrive.
//
// All networking goes through the same code paths a real front end uses.
//
// See also: `tests/chat_scenarios.rs` for the scenarios.

use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::{Duration, Instant};

use chatline_protocol::message::ServerLine;
use chatline_relay::{ChatClient, ClientHandlers, RelayConfig, RelayHandle, start_relay};

/// Default timeout for blocking waits.
const POLL_TIMEOUT: Duration = Duration::from_secs(5);

/// Sleep duration between poll attempts.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// How long to wait for stray traffic before declaring a client quiet.
const QUIET_PERIOD: Duration = Duration::from_millis(200);

/// One callback invocation on the client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Inbound {
    Line(ServerLine),
    Users(BTreeSet<String>),
}

/// Start a relay on a random localhost port.
pub fn start_test_relay() -> (RelayHandle, SocketAddr) {
    start_test_relay_with(RelayConfig::default())
}

/// Start a relay on a random localhost port, taking every other setting
/// from `config`.
pub fn start_test_relay_with(config: RelayConfig) -> (RelayHandle, SocketAddr) {
    let config = RelayConfig {
        host: "127.0.0.1".into(),
        port: 0,
        ..config
    };
    start_relay(config).expect("start_relay failed")
}

/// Build a nickname set from string literals.
pub fn nicknames(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(|n| (*n).to_string()).collect()
}

/// A test chat client wrapping a real `ChatClient`.
pub struct TestChatClient {
    pub client: ChatClient,
    inbox: Receiver<Inbound>,
}

impl TestChatClient {
    /// Connect to a relay and claim `nickname`.
    pub fn connect(addr: SocketAddr, nickname: &str) -> Self {
        let (tx, inbox) = mpsc::channel();
        let users_tx = tx.clone();
        let handlers = ClientHandlers::new(
            move |line| {
                let _ = tx.send(Inbound::Line(line));
            },
            move |users| {
                let _ = users_tx.send(Inbound::Users(users));
            },
        );
        let client = ChatClient::connect(&addr.ip().to_string(), addr.port(), nickname, handlers)
            .expect("ChatClient::connect failed");
        Self { client, inbox }
    }

    /// Connect and wait until the relay has announced this client's own join,
    /// so later assertions are not racing the handshake.
    pub fn connect_and_settle(addr: SocketAddr, nickname: &str) -> Self {
        let client = Self::connect(addr, nickname);
        client.wait_for_line(&ServerLine::Joined {
            nickname: nickname.to_string(),
        });
        client
    }

    /// Non-blocking: everything received so far.
    pub fn poll_raw(&self) -> Vec<Inbound> {
        self.inbox.try_iter().collect()
    }

    /// Wait for the relay to go quiet, then return everything received.
    pub fn quiesce(&self) -> Vec<Inbound> {
        thread::sleep(QUIET_PERIOD);
        self.poll_raw()
    }

    /// Like `quiesce`, keeping only lines (dropping user-list updates).
    pub fn quiesce_lines(&self) -> Vec<ServerLine> {
        self.quiesce()
            .into_iter()
            .filter_map(|inbound| match inbound {
                Inbound::Line(line) => Some(line),
                Inbound::Users(_) => None,
            })
            .collect()
    }

    /// Blocking wait until `expected` arrives. Returns everything received
    /// before it.
    pub fn wait_for_line(&self, expected: &ServerLine) -> Vec<Inbound> {
        self.wait_for_line_within(expected, POLL_TIMEOUT)
    }

    /// `wait_for_line` with an explicit timeout, for scenarios that take
    /// longer than a few round trips.
    pub fn wait_for_line_within(&self, expected: &ServerLine, timeout: Duration) -> Vec<Inbound> {
        self.wait_for(timeout, |inbound| {
            matches!(inbound, Inbound::Line(line) if line == expected)
        })
        .unwrap_or_else(|seen| panic!("timed out waiting for {expected}; saw {} lines", seen.len()))
    }

    /// Blocking wait until a user-list update equal to `expected` arrives.
    pub fn wait_for_user_list(&self, expected: &BTreeSet<String>) -> Vec<Inbound> {
        self.wait_for(POLL_TIMEOUT, |inbound| {
            matches!(inbound, Inbound::Users(users) if users == expected)
        })
            .unwrap_or_else(|seen| {
                panic!("timed out waiting for user list {expected:?}; saw {seen:?}")
            })
    }

    fn wait_for(
        &self,
        timeout: Duration,
        mut done: impl FnMut(&Inbound) -> bool,
    ) -> Result<Vec<Inbound>, Vec<Inbound>> {
        let start = Instant::now();
        let mut seen = Vec::new();
        while start.elapsed() < timeout {
            for inbound in self.inbox.try_iter() {
                if done(&inbound) {
                    return Ok(seen);
                }
                seen.push(inbound);
            }
            thread::sleep(POLL_INTERVAL);
        }
        Err(seen)
    }

    /// Close the connection.
    pub fn disconnect(&mut self) {
        self.client.close();
    }
}
