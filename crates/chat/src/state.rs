use std::collections::{BTreeSet, HashSet};

use {
    chrono::{DateTime, Utc},
    tidings_common::{LocalId, Message},
};

/// What [`ChatState::confirm`] did with a create response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciled {
    /// The provisional entry was replaced in place.
    Replaced,
    /// The server id was already present; the provisional entry was dropped.
    Deduplicated,
    /// No provisional entry was found; the message was appended.
    Appended,
}

/// Ordered message list plus the peers currently typing.
///
/// List order is insertion order. Confirmed entries are unique by server id.
#[derive(Debug, Default, Clone)]
pub struct ChatState {
    messages: Vec<Message>,
    typing: BTreeSet<String>,
}

impl ChatState {
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn typing(&self) -> impl Iterator<Item = &str> {
        self.typing.iter().map(String::as_str)
    }

    pub fn contains(&self, server_id: &str) -> bool {
        self.messages
            .iter()
            .any(|m| m.server_id() == Some(server_id))
    }

    pub fn pending(&self) -> usize {
        self.messages.iter().filter(|m| m.is_provisional()).count()
    }

    fn position_of(&self, local: LocalId) -> Option<usize> {
        self.messages.iter().position(|m| m.local_id() == Some(local))
    }

    pub fn push_provisional(&mut self, message: Message) {
        debug_assert!(message.is_provisional());
        self.messages.push(message);
    }

    /// Resolve the send identified by `local` with the server's copy.
    pub fn confirm(&mut self, local: LocalId, confirmed: Message) -> Reconciled {
        let position = self.position_of(local);
        let duplicate = confirmed
            .server_id()
            .is_some_and(|id| self.contains(id));

        match (position, duplicate) {
            (Some(index), true) => {
                self.messages.remove(index);
                Reconciled::Deduplicated
            },
            (None, true) => Reconciled::Deduplicated,
            (Some(index), false) => {
                self.messages[index] = confirmed;
                Reconciled::Replaced
            },
            (None, false) => {
                self.messages.push(confirmed);
                Reconciled::Appended
            },
        }
    }

    /// Drop the provisional entry for a failed send.
    pub fn rollback(&mut self, local: LocalId) -> bool {
        match self.position_of(local) {
            Some(index) => {
                self.messages.remove(index);
                true
            },
            None => false,
        }
    }

    /// Append a pushed message unless its server id is already present.
    /// Returns false for duplicates and for messages without a server id.
    pub fn merge(&mut self, message: Message) -> bool {
        match message.server_id() {
            Some(id) if !self.contains(id) => {
                self.messages.push(message);
                true
            },
            _ => false,
        }
    }

    /// Replace the list with the server's ordering, then re-append every
    /// provisional entry in its original order.
    pub fn replace_with(&mut self, fetched: Vec<Message>) {
        let mut seen = HashSet::new();
        let pending: Vec<Message> = self
            .messages
            .drain(..)
            .filter(Message::is_provisional)
            .collect();

        self.messages = fetched
            .into_iter()
            .filter(|m| match m.server_id() {
                Some(id) => seen.insert(id.to_string()),
                None => false,
            })
            .collect();
        self.messages.extend(pending);
    }

    /// Set `seen_at` on every message that has none. Returns how many changed.
    pub fn mark_all_seen(&mut self, at: DateTime<Utc>) -> usize {
        self.messages
            .iter_mut()
            .map(|m| m.mark_seen(at))
            .filter(|changed| *changed)
            .count()
    }

    pub fn has_unseen(&self) -> bool {
        self.messages.iter().any(|m| m.seen_at.is_none())
    }

    /// Returns true when the typing set changed.
    pub fn set_typing(&mut self, user_id: &str, typing: bool) -> bool {
        if typing {
            self.typing.insert(user_id.to_string())
        } else {
            self.typing.remove(user_id)
        }
    }
}
