// Registry of live sessions and claimed nicknames.
//
// The registry is owned by the coordinator thread (see `server.rs`) and is
// only touched through `&mut self`, so registering a session and claiming its
// nickname is a single step no other thread can observe half-done. Claimed
// nicknames are derived from the live sessions rather than kept in a second
// set. A nickname is therefore claimed exactly while some live session holds
// it. Two sessions may hold the same nickname; lookups return the one that
// registered first.
//
// Sessions are keyed by `SessionId` in a `BTreeMap`. Iteration order is
// accept order, which makes "first match wins" deterministic.

use std::collections::{BTreeMap, BTreeSet};

use chatline_protocol::message::ServerLine;
use chatline_protocol::types::SessionId;
use log::warn;

use crate::session::Session;

#[derive(Default)]
pub struct Registry {
    sessions: BTreeMap<SessionId, Session>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a session, claiming its nickname.
    pub fn register(&mut self, session: Session) {
        self.sessions.insert(session.id(), session);
    }

    /// Remove a session and release its nickname. Returns the session if it
    /// was registered; calling again is a no-op.
    pub fn unregister(&mut self, id: SessionId) -> Option<Session> {
        self.sessions.remove(&id)
    }

    /// The earliest-registered live session holding `nickname`.
    pub fn find_by_nickname(&self, nickname: &str) -> Option<SessionId> {
        self.live()
            .find(|s| s.nickname() == nickname)
            .map(Session::id)
    }

    pub fn is_claimed(&self, nickname: &str) -> bool {
        self.find_by_nickname(nickname).is_some()
    }

    /// Snapshot of claimed nicknames. Duplicates collapse.
    pub fn all_nicknames(&self) -> BTreeSet<String> {
        self.live().map(|s| s.nickname().to_string()).collect()
    }

    pub fn nickname(&self, id: SessionId) -> Option<&str> {
        self.sessions.get(&id).map(Session::nickname)
    }

    /// Number of registered sessions, including any whose removal is pending.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Deliver a line to one session. Returns false if the session is
    /// unknown, already dead, or the write failed. A failed write schedules
    /// the session for removal.
    pub fn send_to(&mut self, id: SessionId, line: &ServerLine) -> bool {
        let Some(session) = self.sessions.get_mut(&id) else {
            return false;
        };
        if !session.is_alive() {
            return false;
        }
        match session.send(line) {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    "write to session {id} ({}) failed, dropping it: {e}",
                    session.nickname()
                );
                false
            }
        }
    }

    /// Deliver a line to every live session. A failed write does not stop
    /// delivery to the rest.
    pub fn broadcast(&mut self, line: &ServerLine) {
        let ids: Vec<SessionId> = self.live().map(Session::id).collect();
        for id in ids {
            self.send_to(id, line);
        }
    }

    /// Shut down every session's socket. Used when the relay stops.
    pub fn close_all(&mut self) {
        for session in self.sessions.values() {
            session.close();
        }
    }

    fn live(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values().filter(|s| s.is_alive())
    }
}

#[cfg(test)]
mod tests {
    use std::io::BufReader;
    use std::net::TcpStream;

    use super::*;
    use crate::testing::{recv_line, tcp_pair};

    /// Register a session over a fresh TCP pair and return the client's
    /// reader.
    fn add(registry: &mut Registry, id: u64, nickname: &str) -> BufReader<TcpStream> {
        let (client, server) = tcp_pair();
        registry.register(Session::new(SessionId(id), nickname.into(), server));
        BufReader::new(client)
    }

    #[test]
    fn register_claims_nickname() {
        let mut registry = Registry::new();
        assert!(registry.is_empty());
        let _alice = add(&mut registry, 0, "alice");

        assert!(registry.is_claimed("alice"));
        assert!(!registry.is_claimed("bob"));
        assert_eq!(registry.find_by_nickname("alice"), Some(SessionId(0)));
        assert_eq!(registry.nickname(SessionId(0)), Some("alice"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn unregister_is_idempotent() {
        let mut registry = Registry::new();
        let _alice = add(&mut registry, 0, "alice");

        let removed = registry.unregister(SessionId(0));
        assert_eq!(removed.map(|s| s.nickname().to_string()).as_deref(), Some("alice"));
        assert!(registry.unregister(SessionId(0)).is_none());
        assert!(!registry.is_claimed("alice"));
        assert!(registry.nickname(SessionId(0)).is_none());
    }

    #[test]
    fn duplicate_nickname_first_match_wins() {
        let mut registry = Registry::new();
        let _first = add(&mut registry, 3, "alice");
        let _second = add(&mut registry, 5, "alice");

        assert_eq!(registry.find_by_nickname("alice"), Some(SessionId(3)));
        assert_eq!(registry.all_nicknames().len(), 1);

        // The nickname stays claimed while the second holder is live.
        registry.unregister(SessionId(3));
        assert_eq!(registry.find_by_nickname("alice"), Some(SessionId(5)));
    }

    #[test]
    fn all_nicknames_snapshot() {
        let mut registry = Registry::new();
        let _a = add(&mut registry, 0, "carol");
        let _b = add(&mut registry, 1, "alice");
        let _c = add(&mut registry, 2, "bob");

        let names: Vec<String> = registry.all_nicknames().into_iter().collect();
        assert_eq!(names, vec!["alice", "bob", "carol"]);
    }

    #[test]
    fn broadcast_reaches_everyone() {
        let mut registry = Registry::new();
        let mut alice = add(&mut registry, 0, "alice");
        let mut bob = add(&mut registry, 1, "bob");

        registry.broadcast(&ServerLine::Chat {
            from: "alice".into(),
            text: "hi".into(),
        });

        assert_eq!(recv_line(&mut alice), "alice: hi");
        assert_eq!(recv_line(&mut bob), "alice: hi");
    }

    #[test]
    fn failed_write_skips_session_without_aborting_broadcast() {
        let mut registry = Registry::new();
        let _alice = add(&mut registry, 0, "alice");
        let mut bob = add(&mut registry, 1, "bob");

        // Kill alice's socket from the relay side so the next write fails.
        if let Some(session) = registry.sessions.get(&SessionId(0)) {
            session.close();
        }

        registry.broadcast(&ServerLine::ClearHistory);
        assert_eq!(recv_line(&mut bob), "CLEAR_HISTORY");

        // Alice is dead: still registered until her handler reports, but no
        // longer visible to lookups or the user list.
        assert_eq!(registry.nickname(SessionId(0)), Some("alice"));
        assert!(!registry.is_claimed("alice"));
        assert!(!registry.send_to(SessionId(0), &ServerLine::ClearHistory));
        assert_eq!(
            registry.all_nicknames().into_iter().collect::<Vec<_>>(),
            vec!["bob"]
        );
    }

    #[test]
    fn send_to_unknown_session() {
        let mut registry = Registry::new();
        assert!(!registry.send_to(SessionId(9), &ServerLine::ClearHistory));
    }
}
