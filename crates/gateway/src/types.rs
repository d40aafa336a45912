//! Request and response bodies of the REST backend.

use {
    secrecy::{ExposeSecret, SecretString},
    serde::{Deserialize, Serialize, Serializer},
    tidings_common::{CapabilitySet, Message, UserPayload},
};

fn expose<S: Serializer>(secret: &SecretString, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(secret.expose_secret())
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub email: String,
    #[serde(serialize_with = "expose")]
    pub password: SecretString,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    #[serde(serialize_with = "expose")]
    pub password: SecretString,
    #[serde(serialize_with = "expose")]
    pub password_confirmation: SecretString,
}

/// Body of a successful `/login` or `/register`.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    pub access_token: SecretString,
    pub user: UserPayload,
}

/// A role or permission, either a bare name or an object with a `name`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum NamedEntry {
    Name(String),
    Object { name: String },
}

impl NamedEntry {
    pub fn name(&self) -> &str {
        match self {
            Self::Name(name) | Self::Object { name } => name,
        }
    }
}

/// Body of `GET /me`.
#[derive(Debug, Clone, Deserialize)]
pub struct ProfileResponse {
    pub user: UserPayload,
    #[serde(default)]
    pub roles: Vec<NamedEntry>,
    #[serde(default)]
    pub permissions: Vec<NamedEntry>,
}

impl ProfileResponse {
    pub fn role_set(&self) -> CapabilitySet {
        self.roles.iter().map(NamedEntry::name).collect()
    }

    pub fn permission_set(&self) -> CapabilitySet {
        self.permissions.iter().map(NamedEntry::name).collect()
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct MessagesEnvelope {
    #[serde(default)]
    pub messages: Vec<Message>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MessageEnvelope {
    pub message: Message,
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateMessageBody<'a> {
    pub message: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct TypingBody {
    pub typing: bool,
}
