// TCP client for connecting to the chat relay.
//
// This is the protocol-facing half of a chat front end. Architecture:
// - `connect()` opens the TCP connection and sends the nickname line on the
//   calling thread. The relay sends no acknowledgement. It then spawns a
//   background reader thread.
// - The reader thread parses each inbound line into a `ServerLine`.
//   `USER_LIST` lines go to the `on_user_list` handler as a set of
//   nicknames. Every other line goes to `on_line`. Before that, `REACTION`
//   lines are folded into the client's `ReactionTracker` and `TYPING` lines
//   restart the sender's indicator in its `TypingIndicator`, so a front end
//   can query both when it redraws.
// - The caller's thread holds a `BufWriter<TcpStream>` for sending. Writes
//   flush synchronously (acceptable for single short lines).
//
// Handlers run on the reader thread. A UI toolkit that needs its own thread
// should forward from them (e.g. over an `mpsc` channel).

use std::collections::{BTreeMap, BTreeSet};
use std::io::{BufReader, BufWriter};
use std::net::{Shutdown, TcpStream};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use chatline_protocol::framing::{read_line, write_line};
use chatline_protocol::message::{Command, GLOBAL_CHAT_KEY, ServerLine};
use chatline_protocol::types::MessageIndex;
use log::warn;

use crate::error::ClientError;
use crate::reactions::{ReactionSet, ReactionTracker};
use crate::typing::{TYPING_WINDOW, TypingIndicator};

type LineHandler = Box<dyn FnMut(ServerLine) + Send>;
type UserListHandler = Box<dyn FnMut(BTreeSet<String>) + Send>;

/// Callbacks invoked from the client's reader thread.
pub struct ClientHandlers {
    /// Called once per inbound line other than `USER_LIST`.
    pub on_line: LineHandler,
    /// Called once per `USER_LIST` update.
    pub on_user_list: UserListHandler,
}

impl ClientHandlers {
    pub fn new(
        on_line: impl FnMut(ServerLine) + Send + 'static,
        on_user_list: impl FnMut(BTreeSet<String>) + Send + 'static,
    ) -> Self {
        Self {
            on_line: Box::new(on_line),
            on_user_list: Box::new(on_user_list),
        }
    }
}

impl Default for ClientHandlers {
    fn default() -> Self {
        Self::new(|_| {}, |_| {})
    }
}

/// TCP client for relay communication.
pub struct ChatClient {
    nickname: String,
    writer: BufWriter<TcpStream>,
    reactions: Arc<Mutex<ReactionTracker>>,
    typing: Arc<TypingIndicator>,
    reader_thread: Option<JoinHandle<()>>,
    closed: bool,
}

impl ChatClient {
    /// Connect to a relay, claim `nickname`, and start the reader thread.
    pub fn connect(
        host: &str,
        port: u16,
        nickname: &str,
        handlers: ClientHandlers,
    ) -> Result<Self, ClientError> {
        let stream = TcpStream::connect((host, port)).map_err(|source| ClientError::Connect {
            addr: format!("{host}:{port}"),
            source,
        })?;
        let reader_stream = stream.try_clone()?;
        let mut writer = BufWriter::new(stream);

        write_line(&mut writer, nickname)?;

        let reactions = Arc::new(Mutex::new(ReactionTracker::new()));
        let typing = Arc::new(TypingIndicator::new(TYPING_WINDOW));
        let reader = BufReader::new(reader_stream);
        let reader_reactions = Arc::clone(&reactions);
        let reader_typing = Arc::clone(&typing);
        let reader_thread = thread::spawn(move || {
            reader_loop(reader, handlers, &reader_reactions, &reader_typing);
        });

        Ok(Self {
            nickname: nickname.to_string(),
            writer,
            reactions,
            typing,
            reader_thread: Some(reader_thread),
            closed: false,
        })
    }

    pub fn nickname(&self) -> &str {
        &self.nickname
    }

    /// Send a chat line to everyone.
    pub fn send_broadcast(&mut self, text: &str) -> Result<(), ClientError> {
        self.send_raw(text)
    }

    /// Send a private message to `target`.
    pub fn send_whisper(&mut self, target: &str, text: &str) -> Result<(), ClientError> {
        self.send(&Command::Whisper {
            target: target.to_string(),
            text: text.to_string(),
        })
    }

    /// Tell everyone this user is typing.
    pub fn send_typing(&mut self) -> Result<(), ClientError> {
        self.send(&Command::Typing)
    }

    /// React to the message at `index` in this client's own history.
    pub fn send_reaction(&mut self, index: MessageIndex, emoji: &str) -> Result<(), ClientError> {
        self.send(&Command::React {
            index,
            emoji: emoji.to_string(),
        })
    }

    /// Ask whether `name` is online. The answer arrives as a `(SYSTEM)` line.
    pub fn add_friend(&mut self, name: &str) -> Result<(), ClientError> {
        self.send(&Command::AddFriend {
            name: name.to_string(),
        })
    }

    /// Ask the relay for a `CLEAR_HISTORY` signal.
    pub fn clear_history(&mut self) -> Result<(), ClientError> {
        self.send(&Command::Clear)
    }

    /// Send one command.
    pub fn send(&mut self, command: &Command) -> Result<(), ClientError> {
        self.send_raw(&command.to_string())
    }

    /// Reactions seen so far on the message at `index`.
    pub fn reactions_for(&self, index: MessageIndex) -> ReactionSet {
        self.reactions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .reactions_for(index)
            .cloned()
            .unwrap_or_default()
    }

    /// Emoji → participant count for the message at `index`.
    pub fn reaction_counts(&self, index: MessageIndex) -> BTreeMap<String, usize> {
        self.reactions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .counts_for(index)
    }

    /// Peers currently shown as typing in the global chat.
    pub fn typing_users(&self) -> Vec<String> {
        self.typing.typing_users(GLOBAL_CHAT_KEY)
    }

    /// Close the connection and wait for the reader thread to finish.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let _ = self.writer.get_ref().shutdown(Shutdown::Both);
        if let Some(handle) = self.reader_thread.take() {
            let _ = handle.join();
        }
    }

    fn send_raw(&mut self, line: &str) -> Result<(), ClientError> {
        if self.closed {
            return Err(ClientError::Closed);
        }
        write_line(&mut self.writer, line)?;
        Ok(())
    }
}

impl Drop for ChatClient {
    fn drop(&mut self) {
        self.close();
    }
}

/// Reader thread: read lines until EOF or error, routing each to its handler.
fn reader_loop(
    mut reader: BufReader<TcpStream>,
    mut handlers: ClientHandlers,
    reactions: &Mutex<ReactionTracker>,
    typing: &TypingIndicator,
) {
    loop {
        // Relayed lines carry a sender prefix on top of the relay's own line
        // cap, so they are read uncapped.
        let line = match read_line(&mut reader, usize::MAX) {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                // Hang up so the relay announces the departure.
                warn!("chat client read failed, disconnecting: {e}");
                let _ = reader.get_ref().shutdown(Shutdown::Both);
                break;
            }
        };
        match ServerLine::parse(&line) {
            ServerLine::UserList { nicknames } => {
                (handlers.on_user_list)(nicknames.into_iter().collect());
            }
            parsed => {
                match &parsed {
                    ServerLine::Reaction {
                        index,
                        emoji,
                        nickname,
                    } => {
                        reactions
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .record(*index, emoji, nickname);
                    }
                    ServerLine::Typing { nickname, chat_key } => {
                        typing.signal(nickname, chat_key);
                    }
                    _ => {}
                }
                (handlers.on_line)(parsed);
            }
        }
    }
}
