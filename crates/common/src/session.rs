use std::collections::BTreeSet;

use secrecy::SecretString;

/// Lifecycle of the client session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Anonymous,
    /// A login is in flight, or a persisted token is being rehydrated.
    Authenticating,
    Authenticated,
}

/// A named set of granted capabilities (roles or permissions).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapabilitySet(BTreeSet<String>);

impl CapabilitySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has(&self, capability: &str) -> bool {
        self.0.contains(capability)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// The session record. Only the session manager writes it; everyone else
/// reads snapshots.
#[derive(Debug, Clone, Default)]
pub struct Session {
    pub state: SessionState,
    pub user_id: Option<String>,
    pub display_name: String,
    pub email: String,
    pub token: Option<SecretString>,
    pub roles: CapabilitySet,
    pub permissions: CapabilitySet,
    /// True only after a successful profile retrieval.
    pub fetched: bool,
}

impl Session {
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// A persisted token is known but the profile has not been confirmed yet.
    pub fn rehydrating(token: SecretString) -> Self {
        Self {
            state: SessionState::Authenticating,
            token: Some(token),
            ..Self::default()
        }
    }

    /// An authenticated session for a known user, profile not fetched.
    pub fn authenticated(
        user_id: impl Into<String>,
        display_name: impl Into<String>,
        token: SecretString,
    ) -> Self {
        Self {
            state: SessionState::Authenticated,
            user_id: Some(user_id.into()),
            display_name: display_name.into(),
            token: Some(token),
            ..Self::default()
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.state == SessionState::Authenticated
    }

    /// Permission check; always false unless authenticated.
    pub fn can(&self, permission: &str) -> bool {
        self.is_authenticated() && self.permissions.has(permission)
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.is_authenticated() && self.roles.has(role)
    }

    pub fn bearer(&self) -> Option<&SecretString> {
        self.token.as_ref()
    }
}
