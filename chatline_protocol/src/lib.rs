// chatline_protocol: wire protocol for the chatline relay.
//
// This crate defines the line vocabulary and framing used by the relay
// (`chatline_relay`) and its clients to communicate over TCP. It is shared
// between both sides and has no dependencies.
//
// Module overview:
// - `types.rs`:    ID newtypes (`SessionId`, `MessageIndex`).
// - `message.rs`:  `Command` (client → relay grammar) and `ServerLine`
//                  (relay → client vocabulary), each with `Display` for the
//                  exact wire text and a parser for the reverse direction.
// - `framing.rs`:  Newline-delimited framing over any `BufRead`/`Write`.
//
// Design decisions:
// - **Plain text, no serialization format.** Every message is one UTF-8
//   line. The first line a client sends is its nickname, with no
//   acknowledgement.
// - **No async runtime.** Framing uses `std::io`, compatible with blocking
//   TCP streams and buffered wrappers.

pub mod framing;
pub mod message;
pub mod types;

pub use framing::{DEFAULT_MAX_LINE_BYTES, read_line, write_line};
pub use message::{Command, GLOBAL_CHAT_KEY, ServerLine};
pub use types::{MessageIndex, SessionId};

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    /// Write a whole client session to a buffer and read it back through
    /// the framing and the grammar, as the relay does.
    #[test]
    fn client_session_through_framing() {
        let commands = [
            Command::Typing,
            Command::Chat {
                text: "hello everyone".into(),
            },
            Command::Whisper {
                target: "bob".into(),
                text: "just you".into(),
            },
            Command::React {
                index: MessageIndex(1),
                emoji: "🎉".into(),
            },
        ];

        let mut wire = Vec::new();
        write_line(&mut wire, "alice").unwrap();
        for cmd in &commands {
            write_line(&mut wire, &cmd.to_string()).unwrap();
        }

        let mut cursor = Cursor::new(wire);
        let nickname = read_line(&mut cursor, DEFAULT_MAX_LINE_BYTES).unwrap();
        assert_eq!(nickname.as_deref(), Some("alice"));
        for expected in &commands {
            let line = read_line(&mut cursor, DEFAULT_MAX_LINE_BYTES)
                .unwrap()
                .unwrap();
            assert_eq!(Command::parse(&line).as_ref(), Some(expected));
        }
        assert_eq!(read_line(&mut cursor, DEFAULT_MAX_LINE_BYTES).unwrap(), None);
    }
}
