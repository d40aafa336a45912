use crate::types::LocalId;

/// Why an authentication-related operation was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AuthFailure {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("token expired or invalid")]
    Unauthorized,
    #[error("no authenticated session")]
    NotAuthenticated,
}

/// Errors surfaced to callers of explicit user actions.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("authentication failed: {0}")]
    Auth(#[from] AuthFailure),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("network error: {0}")]
    Network(String),

    /// The create request failed after the optimistic insert was rolled back.
    #[error("message {local_id} was not delivered: {cause}")]
    SendFailed {
        local_id: LocalId,
        #[source]
        cause: Box<ClientError>,
    },
}

impl ClientError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::Network(message.into())
    }

    /// True when the server rejected the bearer token, directly or as the
    /// cause of a failed send.
    pub fn is_unauthorized(&self) -> bool {
        match self {
            Self::Auth(AuthFailure::Unauthorized) => true,
            Self::SendFailed { cause, .. } => cause.is_unauthorized(),
            _ => false,
        }
    }
}
