// Message routing for the relay.
//
// `Router` is the central data structure that `server.rs` drives. It owns the
// `Registry` and the `ReactionTracker`, the only shared mutable state in the
// relay. All mutation happens through methods called from the server's single
// coordinator thread, so there is no internal locking.
//
// Key responsibilities:
// - Join: register the session, announce `** <nick> joined the chat **`,
//   then broadcast the full user list.
// - Line dispatch: classify each inbound line with `Command::parse` and
//   carry it out (broadcast, whisper, reply to sender, or record a
//   reaction). Incomplete commands are dropped with no reply.
// - Leave: unregister, announce `** <nick> left the chat **`, rebroadcast the
//   user list, and shut the socket. Idempotent, so the departure is announced
//   at most once per session.
//
// Write failures are handled inside `Registry`. Delivery to the other
// sessions continues, and the failed session's handler reports the
// disconnect, which lands back here in `leave`.

use chatline_protocol::message::{Command, GLOBAL_CHAT_KEY, ServerLine};
use chatline_protocol::types::SessionId;
use log::{debug, info};

use crate::reactions::ReactionTracker;
use crate::registry::Registry;
use crate::session::Session;

#[derive(Default)]
pub struct Router {
    registry: Registry,
    reactions: ReactionTracker,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn reactions(&self) -> &ReactionTracker {
        &self.reactions
    }

    /// Register a session whose handshake just completed and announce it.
    pub fn join(&mut self, session: Session) {
        let nickname = session.nickname().to_string();
        info!("{nickname} joined as session {}", session.id());
        self.registry.register(session);
        self.registry.broadcast(&ServerLine::Joined { nickname });
        self.broadcast_user_list();
    }

    /// Remove a session and announce its departure. No-op if it already left.
    pub fn leave(&mut self, id: SessionId) {
        let Some(session) = self.registry.unregister(id) else {
            return;
        };
        session.close();
        let nickname = session.nickname().to_string();
        info!("{nickname} (session {id}) left");
        self.registry.broadcast(&ServerLine::Left { nickname });
        self.broadcast_user_list();
    }

    /// Handle one line from a registered session.
    pub fn handle_line(&mut self, id: SessionId, line: &str) {
        let Some(nickname) = self.registry.nickname(id).map(str::to_string) else {
            debug!("dropping line from unregistered session {id}");
            return;
        };
        match Command::parse(line) {
            Some(command) => self.dispatch(id, &nickname, command),
            None => debug!("ignoring incomplete command from {nickname}: {line:?}"),
        }
    }

    /// Carry out one parsed command from `nickname`.
    pub fn dispatch(&mut self, id: SessionId, nickname: &str, command: Command) {
        debug!("{nickname} (session {id}): {}", command.kind());
        match command {
            Command::Typing => {
                self.registry.broadcast(&ServerLine::Typing {
                    nickname: nickname.to_string(),
                    chat_key: GLOBAL_CHAT_KEY.to_string(),
                });
            }
            Command::AddFriend { name } => {
                // Lookup only; no friendship is stored.
                let reply = if self.registry.is_claimed(&name) {
                    ServerLine::FriendAdded { name }
                } else {
                    ServerLine::FriendNotFound { name }
                };
                self.registry.send_to(id, &reply);
            }
            Command::Clear => {
                self.registry.send_to(id, &ServerLine::ClearHistory);
            }
            Command::Whisper { target, text } => self.whisper(id, nickname, target, text),
            Command::React { index, emoji } => {
                self.reactions.record(index, &emoji, nickname);
                self.registry.broadcast(&ServerLine::Reaction {
                    index,
                    emoji,
                    nickname: nickname.to_string(),
                });
            }
            Command::Chat { text } => {
                self.registry.broadcast(&ServerLine::Chat {
                    from: nickname.to_string(),
                    text,
                });
            }
        }
    }

    /// Shut down every connection. Handler threads see EOF and exit.
    pub fn shutdown(&mut self) {
        self.registry.close_all();
    }

    fn whisper(&mut self, id: SessionId, nickname: &str, target: String, text: String) {
        let Some(target_id) = self.registry.find_by_nickname(&target) else {
            self.registry
                .send_to(id, &ServerLine::WhisperTargetNotFound { name: target });
            return;
        };
        let echo = text.trim().to_string();
        self.registry.send_to(
            target_id,
            &ServerLine::Whisper {
                from: nickname.to_string(),
                text,
            },
        );
        self.registry
            .send_to(id, &ServerLine::WhisperEcho { target, text: echo });
    }

    fn broadcast_user_list(&mut self) {
        let nicknames = self.registry.all_nicknames().into_iter().collect();
        self.registry.broadcast(&ServerLine::UserList { nicknames });
    }
}

#[cfg(test)]
mod tests {
    use std::io::BufReader;
    use std::net::TcpStream;

    use chatline_protocol::types::MessageIndex;

    use super::*;
    use crate::testing::{drain_lines, recv_line, tcp_pair};

    /// Join a session over a fresh TCP pair. Returns the client's reader.
    fn join(router: &mut Router, id: u64, nickname: &str) -> BufReader<TcpStream> {
        let (client, server) = tcp_pair();
        router.join(Session::new(SessionId(id), nickname.into(), server));
        BufReader::new(client)
    }

    /// Router with alice (0) and bob (1) joined and their join traffic
    /// drained.
    fn alice_and_bob() -> (Router, BufReader<TcpStream>, BufReader<TcpStream>) {
        let mut router = Router::new();
        let mut alice = join(&mut router, 0, "alice");
        let mut bob = join(&mut router, 1, "bob");
        drain_lines(&mut alice);
        drain_lines(&mut bob);
        (router, alice, bob)
    }

    #[test]
    fn join_announces_then_sends_user_list() {
        let mut router = Router::new();
        let mut alice = join(&mut router, 0, "alice");

        assert_eq!(recv_line(&mut alice), "** alice joined the chat **");
        assert_eq!(recv_line(&mut alice), "USER_LIST alice");

        let mut bob = join(&mut router, 1, "bob");
        assert_eq!(recv_line(&mut alice), "** bob joined the chat **");
        assert_eq!(recv_line(&mut alice), "USER_LIST alice,bob");
        assert_eq!(recv_line(&mut bob), "** bob joined the chat **");
        assert_eq!(recv_line(&mut bob), "USER_LIST alice,bob");
    }

    #[test]
    fn chat_is_broadcast_with_sender_prefix() {
        let (mut router, mut alice, mut bob) = alice_and_bob();

        router.handle_line(SessionId(0), "hello there");

        assert_eq!(recv_line(&mut alice), "alice: hello there");
        assert_eq!(recv_line(&mut bob), "alice: hello there");
    }

    #[test]
    fn whisper_reaches_only_target_and_echoes_to_sender() {
        let (mut router, mut alice, mut bob) = alice_and_bob();
        let mut carol = join(&mut router, 2, "carol");
        drain_lines(&mut alice);
        drain_lines(&mut bob);
        drain_lines(&mut carol);

        router.handle_line(SessionId(0), "/w bob meet at noon");

        assert_eq!(drain_lines(&mut bob), vec!["(whisper) alice: meet at noon"]);
        assert_eq!(drain_lines(&mut alice), vec!["(whisper to bob) meet at noon"]);
        assert!(drain_lines(&mut carol).is_empty());
    }

    #[test]
    fn whisper_to_unknown_replies_to_sender_only() {
        let (mut router, mut alice, mut bob) = alice_and_bob();

        router.handle_line(SessionId(0), "/w ghost boo");

        assert_eq!(drain_lines(&mut alice), vec!["(SYSTEM) User 'ghost' not found."]);
        assert!(drain_lines(&mut bob).is_empty());
    }

    #[test]
    fn whisper_with_duplicate_nickname_goes_to_first() {
        let (mut router, mut alice, mut bob) = alice_and_bob();
        let mut bob2 = join(&mut router, 2, "bob");
        drain_lines(&mut alice);
        drain_lines(&mut bob);
        drain_lines(&mut bob2);

        router.handle_line(SessionId(0), "/w bob hi");

        assert_eq!(drain_lines(&mut bob), vec!["(whisper) alice: hi"]);
        assert!(drain_lines(&mut bob2).is_empty());
    }

    #[test]
    fn addfriend_reports_presence() {
        let (mut router, mut alice, mut bob) = alice_and_bob();

        router.handle_line(SessionId(0), "/addfriend bob");
        router.handle_line(SessionId(0), "/addfriend ghost");

        assert_eq!(
            drain_lines(&mut alice),
            vec![
                "(SYSTEM) Added friend: bob",
                "(SYSTEM) User 'ghost' not found"
            ]
        );
        assert!(drain_lines(&mut bob).is_empty());
    }

    #[test]
    fn clear_replies_to_sender_only() {
        let (mut router, mut alice, mut bob) = alice_and_bob();

        router.handle_line(SessionId(1), "/clear");

        assert_eq!(drain_lines(&mut bob), vec!["CLEAR_HISTORY"]);
        assert!(drain_lines(&mut alice).is_empty());
    }

    #[test]
    fn typing_is_broadcast_with_global_key() {
        let (mut router, mut alice, mut bob) = alice_and_bob();

        router.handle_line(SessionId(1), "/typing");

        assert_eq!(recv_line(&mut alice), "TYPING bob All");
        assert_eq!(recv_line(&mut bob), "TYPING bob All");
    }

    #[test]
    fn reaction_is_tracked_and_broadcast() {
        let (mut router, mut alice, mut bob) = alice_and_bob();

        router.handle_line(SessionId(0), "/react 0 ❤️");
        router.handle_line(SessionId(0), "/react 0 ❤️");

        assert_eq!(recv_line(&mut alice), "REACTION 0 ❤️ alice");
        assert_eq!(recv_line(&mut bob), "REACTION 0 ❤️ alice");
        assert_eq!(router.reactions().participants(MessageIndex(0), "❤️"), 1);
    }

    #[test]
    fn malformed_commands_are_silent() {
        let (mut router, mut alice, mut bob) = alice_and_bob();

        router.handle_line(SessionId(0), "/w bob");
        router.handle_line(SessionId(0), "/react first 👍");

        assert!(drain_lines(&mut alice).is_empty());
        assert!(drain_lines(&mut bob).is_empty());
        assert!(router.reactions().is_empty());
    }

    #[test]
    fn leave_announces_once() {
        let (mut router, mut alice, mut bob) = alice_and_bob();

        router.leave(SessionId(1));
        router.leave(SessionId(1));

        assert_eq!(
            drain_lines(&mut alice),
            vec!["** bob left the chat **", "USER_LIST alice"]
        );
        assert!(!router.registry().is_claimed("bob"));
        // Bob's socket was shut down by the relay.
        assert_eq!(
            chatline_protocol::framing::read_line(&mut bob, 1024).unwrap(),
            None
        );
    }

    #[test]
    fn lines_from_departed_session_are_dropped() {
        let (mut router, mut alice, _bob) = alice_and_bob();
        router.leave(SessionId(1));
        drain_lines(&mut alice);

        router.handle_line(SessionId(1), "still here?");
        assert!(drain_lines(&mut alice).is_empty());
    }
}
