//! Gateway to the REST backend.
//!
//! [`ApiGateway`] is the request/response contract the session manager and
//! the message store depend on. [`HttpGateway`] implements it over reqwest;
//! with the `test-support` feature, [`ScriptedGateway`] implements it from
//! queued responses so callers can be tested without a server.

pub mod error;
pub mod http;
#[cfg(any(test, feature = "test-support"))]
pub mod scripted;
pub mod types;

use {async_trait::async_trait, secrecy::SecretString, tidings_common::Message};

pub use {
    error::{ApiError, ApiResult},
    http::HttpGateway,
    types::{AuthResponse, LoginRequest, NamedEntry, ProfileResponse, RegisterRequest},
};

#[cfg(any(test, feature = "test-support"))]
pub use scripted::{Call, ScriptedGateway};

/// HTTP methods accepted by [`ApiGateway::request_json`].
pub use reqwest::Method;

/// Authenticated access to the backend. Every method except `login` and
/// `register` carries the session's bearer token.
#[async_trait]
pub trait ApiGateway: Send + Sync {
    /// `POST /login`
    async fn login(&self, req: &LoginRequest) -> ApiResult<AuthResponse>;

    /// `POST /register`
    async fn register(&self, req: &RegisterRequest) -> ApiResult<AuthResponse>;

    /// `GET /me`
    async fn me(&self, token: &SecretString) -> ApiResult<ProfileResponse>;

    /// `GET /chat/messages`
    async fn list_messages(&self, token: &SecretString) -> ApiResult<Vec<Message>>;

    /// `POST /chat/messages`
    async fn create_message(&self, token: &SecretString, body: &str) -> ApiResult<Message>;

    /// `POST /chat/seen`
    async fn mark_seen(&self, token: &SecretString) -> ApiResult<()>;

    /// `POST /chat/typing`
    async fn send_typing(&self, token: &SecretString, typing: bool) -> ApiResult<()>;

    /// Opaque pass-through for endpoints the client does not model
    /// (attendance, leave requests).
    async fn request_json(
        &self,
        token: &SecretString,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> ApiResult<serde_json::Value>;
}
