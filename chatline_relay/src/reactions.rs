// Emoji reactions per message index.
//
// Maps a message index to emoji to the set of nicknames that applied it. The
// intermediate maps are created on first use and never evicted. Because the
// innermost container is a set, a repeated reaction from the same user counts
// once.
//
// The relay's `Router` keeps one tracker for the whole process. `ChatClient`
// keeps its own, fed from `REACTION` lines, for rendering. Indices are
// client-local message counts (see `MessageIndex`), so the tracker does not
// check that an index refers to a real message.

use std::collections::{BTreeMap, BTreeSet};

use chatline_protocol::types::MessageIndex;

/// Emoji → nicknames for one message.
pub type ReactionSet = BTreeMap<String, BTreeSet<String>>;

#[derive(Clone, Debug, Default)]
pub struct ReactionTracker {
    entries: BTreeMap<MessageIndex, ReactionSet>,
}

impl ReactionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `nickname` reacted with `emoji` to message `index`.
    /// Returns false if that exact reaction was already recorded.
    pub fn record(&mut self, index: MessageIndex, emoji: &str, nickname: &str) -> bool {
        self.entries
            .entry(index)
            .or_default()
            .entry(emoji.to_string())
            .or_default()
            .insert(nickname.to_string())
    }

    /// All reactions on one message, if it has any.
    pub fn reactions_for(&self, index: MessageIndex) -> Option<&ReactionSet> {
        self.entries.get(&index)
    }

    /// Emoji → participant count for one message, for rendering.
    pub fn counts_for(&self, index: MessageIndex) -> BTreeMap<String, usize> {
        self.reactions_for(index)
            .map(|set| {
                set.iter()
                    .map(|(emoji, users)| (emoji.clone(), users.len()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of distinct users who applied `emoji` to `index`.
    pub fn participants(&self, index: MessageIndex, emoji: &str) -> usize {
        self.reactions_for(index)
            .and_then(|set| set.get(emoji))
            .map_or(0, BTreeSet::len)
    }

    /// Number of messages with at least one reaction.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
