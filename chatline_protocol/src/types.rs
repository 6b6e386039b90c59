// Core ID types for the chat protocol.
//
// Lightweight newtypes shared by `message.rs` and the relay's registry and
// reaction tracker. `SessionId` is relay-assigned and never crosses the wire.
// Nicknames are not unique, so the relay needs its own key for a
// connection. `MessageIndex` is client-assigned. Each peer numbers messages
// by its own visible history, so two peers may disagree about what a given
// index refers to. The relay forwards it as-is.

use std::fmt;
use std::str::FromStr;

/// Relay-assigned connection ID, monotonically increasing in accept order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Position of a message in a client's local history.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageIndex(pub u32);

impl fmt::Display for MessageIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MessageIndex {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(MessageIndex)
    }
}
