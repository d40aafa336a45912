use std::fmt;

use {
    chrono::{DateTime, Utc},
    serde::{Deserialize, Deserializer, Serialize},
};

// ── Identifiers ─────────────────────────────────────────────────────────────

/// Client-local identifier of an unconfirmed message.
///
/// Drawn from a per-store monotonic counter and never reused, so two
/// overlapping sends can always be told apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LocalId(pub u64);

impl fmt::Display for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "local-{}", self.0)
    }
}

/// Message identity. A provisional id lives in a different variant than a
/// server-issued id, so the two can never compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MessageId {
    Provisional(LocalId),
    Confirmed(String),
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Provisional(local) => local.fmt(f),
            Self::Confirmed(id) => f.write_str(id),
        }
    }
}

/// Ids arrive as JSON numbers from some backends and as strings from others.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawId {
    Number(u64),
    Text(String),
}

impl From<RawId> for String {
    fn from(raw: RawId) -> Self {
        match raw {
            RawId::Number(n) => n.to_string(),
            RawId::Text(s) => s,
        }
    }
}

/// `deserialize_with` helper accepting a numeric or string id.
pub fn id_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    RawId::deserialize(deserializer).map(Into::into)
}

// ── Users ───────────────────────────────────────────────────────────────────

/// User object as returned by `/login`, `/register` and `/me`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UserPayload {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
}

// ── Messages ────────────────────────────────────────────────────────────────

/// A chat message as held by the message store.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "WireMessage")]
pub struct Message {
    pub id: MessageId,
    pub author_id: String,
    pub author_name: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub seen_at: Option<DateTime<Utc>>,
}

impl Message {
    /// Build the optimistic entry for a send that has not been confirmed yet.
    pub fn provisional(
        local_id: LocalId,
        author_id: impl Into<String>,
        author_name: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            id: MessageId::Provisional(local_id),
            author_id: author_id.into(),
            author_name: author_name.into(),
            body: body.into(),
            created_at: Utc::now(),
            seen_at: None,
        }
    }

    /// Build a server-confirmed message.
    pub fn confirmed(
        id: impl Into<String>,
        author_id: impl Into<String>,
        author_name: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            id: MessageId::Confirmed(id.into()),
            author_id: author_id.into(),
            author_name: author_name.into(),
            body: body.into(),
            created_at: Utc::now(),
            seen_at: None,
        }
    }

    pub fn is_provisional(&self) -> bool {
        matches!(self.id, MessageId::Provisional(_))
    }

    /// The server-issued id, if this message has been confirmed.
    pub fn server_id(&self) -> Option<&str> {
        match &self.id {
            MessageId::Confirmed(id) => Some(id),
            MessageId::Provisional(_) => None,
        }
    }

    pub fn local_id(&self) -> Option<LocalId> {
        match self.id {
            MessageId::Provisional(local) => Some(local),
            MessageId::Confirmed(_) => None,
        }
    }

    /// Set `seen_at` if it is unset. Returns true when the message changed.
    pub fn mark_seen(&mut self, at: DateTime<Utc>) -> bool {
        if self.seen_at.is_some() {
            return false;
        }
        self.seen_at = Some(at);
        true
    }
}

/// Author reference embedded in a server message.
#[derive(Debug, Clone, Deserialize)]
pub struct WireAuthor {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Message shape as produced by the chat API and the broadcaster.
#[derive(Debug, Clone, Deserialize)]
pub struct WireMessage {
    pub id: RawId,
    #[serde(alias = "body")]
    pub message: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub seen_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub user: Option<WireAuthor>,
    #[serde(default)]
    pub user_id: Option<RawId>,
}

impl From<WireMessage> for Message {
    fn from(wire: WireMessage) -> Self {
        let (author_id, author_name) = match (wire.user, wire.user_id) {
            (Some(user), _) => (user.id, user.name.unwrap_or_default()),
            (None, Some(id)) => (id.into(), String::new()),
            (None, None) => (String::new(), String::new()),
        };
        Self {
            id: MessageId::Confirmed(wire.id.into()),
            author_id,
            author_name,
            body: wire.message,
            created_at: wire.created_at,
            seen_at: wire.seen_at,
        }
    }
}
