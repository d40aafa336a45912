use tidings_common::{AuthFailure, ClientError};

pub type ApiResult<T> = Result<T, ApiError>;

/// Failure of a single backend call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// 401 or 403: the token (or credentials) were rejected.
    #[error("unauthorized (HTTP {status})")]
    Unauthorized { status: u16 },

    /// 422 with the server's message.
    #[error("{message}")]
    Validation { message: String },

    #[error("server returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("unexpected response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

impl From<ApiError> for ClientError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Unauthorized { .. } => ClientError::Auth(AuthFailure::Unauthorized),
            ApiError::Validation { message } => ClientError::Validation(message),
            other => ClientError::Network(other.to_string()),
        }
    }
}
