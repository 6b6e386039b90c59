// Protocol messages for client-relay communication.
//
// Two enums define the full protocol vocabulary:
// - `Command`: a line sent by a client to the relay, classified by a
//   fixed-order prefix grammar. Anything that is not a recognized slash
//   command is ordinary chat.
// - `ServerLine`: a line sent by the relay to clients.
//
// Both directions are plain text. `Display` produces the exact wire form and
// `parse` reads it back. `Command::parse` returns `None` for an
// incomplete command (e.g. `/w bob` with no text). The relay treats that
// as a no-op with no reply.

use std::fmt;

use crate::types::MessageIndex;

/// Chat key attached to every typing signal the relay relays. There is only
/// one global room.
pub const GLOBAL_CHAT_KEY: &str = "All";

/// A line sent by a client, after the nickname handshake.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// `/typing`: the sender is composing a message.
    Typing,
    /// `/addfriend <name>`: check whether `name` is online.
    AddFriend { name: String },
    /// `/clear`: ask the relay to echo a history-reset signal.
    Clear,
    /// `/w <target> <text>`: private message.
    Whisper { target: String, text: String },
    /// `/react <index> <emoji>`: annotate a message.
    React { index: MessageIndex, emoji: String },
    /// Anything else is broadcast verbatim.
    Chat { text: String },
}

impl Command {
    /// Classify an inbound line. The first matching prefix wins. Returns `None`
    /// when a recognized command is missing arguments or has a non-numeric
    /// reaction index.
    pub fn parse(line: &str) -> Option<Self> {
        if line == "/typing" {
            return Some(Self::Typing);
        }
        if let Some(rest) = line.strip_prefix("/addfriend ") {
            return Some(Self::AddFriend {
                name: rest.trim().to_string(),
            });
        }
        if line == "/clear" {
            return Some(Self::Clear);
        }
        if let Some(rest) = line.strip_prefix("/w ") {
            let (target, text) = rest.split_once(' ')?;
            return Some(Self::Whisper {
                target: target.to_string(),
                text: text.to_string(),
            });
        }
        if let Some(rest) = line.strip_prefix("/react ") {
            let (index, emoji) = rest.split_once(' ')?;
            if emoji.is_empty() {
                return None;
            }
            return Some(Self::React {
                index: index.parse().ok()?,
                emoji: emoji.to_string(),
            });
        }
        Some(Self::Chat {
            text: line.to_string(),
        })
    }

    /// Short label for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Typing => "typing",
            Self::AddFriend { .. } => "addfriend",
            Self::Clear => "clear",
            Self::Whisper { .. } => "whisper",
            Self::React { .. } => "react",
            Self::Chat { .. } => "chat",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Typing => f.write_str("/typing"),
            Self::AddFriend { name } => write!(f, "/addfriend {name}"),
            Self::Clear => f.write_str("/clear"),
            Self::Whisper { target, text } => write!(f, "/w {target} {text}"),
            Self::React { index, emoji } => write!(f, "/react {index} {emoji}"),
            Self::Chat { text } => f.write_str(text),
        }
    }
}

/// A line sent by the relay.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ServerLine {
    /// `USER_LIST <csv>`: full membership snapshot.
    UserList { nicknames: Vec<String> },
    /// `** <nick> joined the chat **`
    Joined { nickname: String },
    /// `** <nick> left the chat **`
    Left { nickname: String },
    /// `<nick>: <text>`
    Chat { from: String, text: String },
    /// `(whisper) <nick>: <text>`, delivered to the recipient.
    Whisper { from: String, text: String },
    /// `(whisper to <target>) <text>`, echoed back to the sender.
    WhisperEcho { target: String, text: String },
    /// `(SYSTEM) Added friend: <name>`
    FriendAdded { name: String },
    /// `(SYSTEM) User '<name>' not found` (friend lookup, no period).
    FriendNotFound { name: String },
    /// `(SYSTEM) User '<name>' not found.` (whisper target, with period).
    WhisperTargetNotFound { name: String },
    /// `CLEAR_HISTORY`
    ClearHistory,
    /// `TYPING <nick> <chatKey>`
    Typing { nickname: String, chat_key: String },
    /// `REACTION <index> <emoji> <nick>`
    Reaction {
        index: MessageIndex,
        emoji: String,
        nickname: String,
    },
    /// A line that matches none of the above. Only produced by `parse`.
    Unrecognized(String),
}

impl ServerLine {
    /// Interpret a line received from the relay. Never fails: anything
    /// unrecognized comes back as `Unrecognized`.
    pub fn parse(line: &str) -> Self {
        if let Some(csv) = line.strip_prefix("USER_LIST ") {
            let nicknames = csv
                .split(',')
                .filter(|n| !n.is_empty())
                .map(str::to_string)
                .collect();
            return Self::UserList { nicknames };
        }
        if line == "USER_LIST" {
            return Self::UserList {
                nicknames: Vec::new(),
            };
        }
        if line == "CLEAR_HISTORY" {
            return Self::ClearHistory;
        }
        if let Some(rest) = line.strip_prefix("TYPING ") {
            if let Some((nickname, chat_key)) = rest.rsplit_once(' ') {
                return Self::Typing {
                    nickname: nickname.to_string(),
                    chat_key: chat_key.to_string(),
                };
            }
        }
        if let Some(rest) = line.strip_prefix("REACTION ") {
            if let Some(reaction) = parse_reaction(rest) {
                return reaction;
            }
        }
        if let Some(inner) = line.strip_prefix("** ") {
            if let Some(nickname) = inner.strip_suffix(" joined the chat **") {
                return Self::Joined {
                    nickname: nickname.to_string(),
                };
            }
            if let Some(nickname) = inner.strip_suffix(" left the chat **") {
                return Self::Left {
                    nickname: nickname.to_string(),
                };
            }
        }
        if let Some(rest) = line.strip_prefix("(whisper to ") {
            if let Some((target, text)) = rest.split_once(") ") {
                return Self::WhisperEcho {
                    target: target.to_string(),
                    text: text.to_string(),
                };
            }
        }
        if let Some(rest) = line.strip_prefix("(whisper) ") {
            if let Some((from, text)) = rest.split_once(": ") {
                return Self::Whisper {
                    from: from.to_string(),
                    text: text.to_string(),
                };
            }
        }
        if let Some(rest) = line.strip_prefix("(SYSTEM) ") {
            if let Some(name) = rest.strip_prefix("Added friend: ") {
                return Self::FriendAdded {
                    name: name.to_string(),
                };
            }
            if let Some(inner) = rest.strip_prefix("User '") {
                if let Some(name) = inner.strip_suffix("' not found.") {
                    return Self::WhisperTargetNotFound {
                        name: name.to_string(),
                    };
                }
                if let Some(name) = inner.strip_suffix("' not found") {
                    return Self::FriendNotFound {
                        name: name.to_string(),
                    };
                }
            }
        }
        if let Some((from, text)) = line.split_once(": ") {
            return Self::Chat {
                from: from.to_string(),
                text: text.to_string(),
            };
        }
        Self::Unrecognized(line.to_string())
    }
}

/// `<index> <emoji> <nick>`. The emoji is a single space-free token; the
/// nickname takes the rest of the line.
fn parse_reaction(rest: &str) -> Option<ServerLine> {
    let mut parts = rest.splitn(3, ' ');
    let index = parts.next()?.parse().ok()?;
    let emoji = parts.next()?;
    let nickname = parts.next()?;
    Some(ServerLine::Reaction {
        index,
        emoji: emoji.to_string(),
        nickname: nickname.to_string(),
    })
}

impl fmt::Display for ServerLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UserList { nicknames } => write!(f, "USER_LIST {}", nicknames.join(",")),
            Self::Joined { nickname } => write!(f, "** {nickname} joined the chat **"),
            Self::Left { nickname } => write!(f, "** {nickname} left the chat **"),
            Self::Chat { from, text } => write!(f, "{from}: {text}"),
            Self::Whisper { from, text } => write!(f, "(whisper) {from}: {text}"),
            Self::WhisperEcho { target, text } => write!(f, "(whisper to {target}) {text}"),
            Self::FriendAdded { name } => write!(f, "(SYSTEM) Added friend: {name}"),
            Self::FriendNotFound { name } => write!(f, "(SYSTEM) User '{name}' not found"),
            Self::WhisperTargetNotFound { name } => {
                write!(f, "(SYSTEM) User '{name}' not found.")
            }
            Self::ClearHistory => f.write_str("CLEAR_HISTORY"),
            Self::Typing { nickname, chat_key } => write!(f, "TYPING {nickname} {chat_key}"),
            Self::Reaction {
                index,
                emoji,
                nickname,
            } => write!(f, "REACTION {index} {emoji} {nickname}"),
            Self::Unrecognized(line) => f.write_str(line),
        }
    }
}
