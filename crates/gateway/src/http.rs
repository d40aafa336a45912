use std::time::Duration;

use {
    async_trait::async_trait,
    reqwest::{RequestBuilder, Response, StatusCode, header},
    secrecy::{ExposeSecret, SecretString},
    serde::de::DeserializeOwned,
    tidings_common::Message,
    tidings_config::ApiConfig,
    tracing::{debug, warn},
};

use crate::{
    ApiGateway, Method,
    error::{ApiError, ApiResult},
    types::{
        AuthResponse, CreateMessageBody, LoginRequest, MessageEnvelope, MessagesEnvelope,
        ProfileResponse, RegisterRequest, TypingBody,
    },
};

/// reqwest-backed [`ApiGateway`].
#[derive(Debug, Clone)]
pub struct HttpGateway {
    client: reqwest::Client,
    base_url: String,
}

impl HttpGateway {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &ApiConfig) -> ApiResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, self.url(path))
            .header(header::ACCEPT, "application/json")
    }

    fn authed(&self, method: Method, path: &str, token: &SecretString) -> RequestBuilder {
        self.request(method, path).bearer_auth(token.expose_secret())
    }

    async fn fetch<T: DeserializeOwned>(&self, req: RequestBuilder) -> ApiResult<T> {
        let resp = check(req.send().await?).await?;
        Ok(resp.json::<T>().await?)
    }

    async fn ack(&self, req: RequestBuilder) -> ApiResult<()> {
        check(req.send().await?).await.map(drop)
    }
}

/// Map non-success statuses onto [`ApiError`].
async fn check(resp: Response) -> ApiResult<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let body = resp.text().await.unwrap_or_default();
    debug!(status = status.as_u16(), "backend request failed");
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(ApiError::Unauthorized {
            status: status.as_u16(),
        }),
        StatusCode::UNPROCESSABLE_ENTITY => Err(ApiError::Validation {
            message: validation_message(&body),
        }),
        _ => Err(ApiError::Status {
            status: status.as_u16(),
            body,
        }),
    }
}

/// Laravel-style `{"message": "..."}`; falls back to the raw body.
fn validation_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(String::from))
        .unwrap_or_else(|| body.to_string())
}

#[async_trait]
impl ApiGateway for HttpGateway {
    async fn login(&self, req: &LoginRequest) -> ApiResult<AuthResponse> {
        self.fetch(self.request(Method::POST, "/login").json(req))
            .await
    }

    async fn register(&self, req: &RegisterRequest) -> ApiResult<AuthResponse> {
        self.fetch(self.request(Method::POST, "/register").json(req))
            .await
    }

    async fn me(&self, token: &SecretString) -> ApiResult<ProfileResponse> {
        self.fetch(self.authed(Method::GET, "/me", token)).await
    }

    async fn list_messages(&self, token: &SecretString) -> ApiResult<Vec<Message>> {
        let envelope: MessagesEnvelope = self
            .fetch(self.authed(Method::GET, "/chat/messages", token))
            .await?;
        Ok(envelope.messages)
    }

    async fn create_message(&self, token: &SecretString, body: &str) -> ApiResult<Message> {
        let envelope: MessageEnvelope = self
            .fetch(
                self.authed(Method::POST, "/chat/messages", token)
                    .json(&CreateMessageBody { message: body }),
            )
            .await?;
        Ok(envelope.message)
    }

    async fn mark_seen(&self, token: &SecretString) -> ApiResult<()> {
        self.ack(self.authed(Method::POST, "/chat/seen", token))
            .await
    }

    async fn send_typing(&self, token: &SecretString, typing: bool) -> ApiResult<()> {
        self.ack(
            self.authed(Method::POST, "/chat/typing", token)
                .json(&TypingBody { typing }),
        )
        .await
    }

    async fn request_json(
        &self,
        token: &SecretString,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> ApiResult<serde_json::Value> {
        let mut req = self.authed(method, path, token);
        if let Some(body) = body {
            req = req.json(&body);
        }
        let resp = check(req.send().await?).await?;
        let text = resp.text().await?;
        if text.trim().is_empty() {
            return Ok(serde_json::Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| {
            warn!(path, error = %e, "pass-through response is not JSON");
            ApiError::Decode(e.to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use {super::*, mockito::Matcher};

    fn token() -> SecretString {
        SecretString::new("tok-1".into())
    }

    #[tokio::test]
    async fn login_posts_credentials() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/login")
            .match_body(Matcher::Json(serde_json::json!({
                "email": "ana@x.io",
                "password": "secret-pw",
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"abc","user":{"id":5,"name":"Ana","email":"ana@x.io"}}"#)
            .create_async()
            .await;

        let gw = HttpGateway::new(format!("{}/api/", server.url()));
        let resp = gw
            .login(&LoginRequest {
                email: "ana@x.io".into(),
                password: SecretString::new("secret-pw".into()),
            })
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(resp.access_token.expose_secret(), "abc");
        assert_eq!(resp.user.id, "5");
    }

    #[tokio::test]
    async fn me_sends_bearer_token() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/me")
            .match_header("authorization", "Bearer tok-1")
            .match_header("accept", "application/json")
            .with_status(200)
            .with_body(r#"{"user":{"id":"u1","name":"Bo"},"roles":["hr"],"permissions":[]}"#)
            .create_async()
            .await;

        let gw = HttpGateway::new(server.url());
        let profile = gw.me(&token()).await.unwrap();
        mock.assert_async().await;
        assert!(profile.role_set().has("hr"));
    }

    #[tokio::test]
    async fn unauthorized_and_validation_statuses() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/me")
            .with_status(401)
            .with_body(r#"{"message":"Unauthenticated."}"#)
            .create_async()
            .await;
        server
            .mock("POST", "/chat/messages")
            .with_status(422)
            .with_body(r#"{"message":"The message field is required.","errors":{}}"#)
            .create_async()
            .await;

        let gw = HttpGateway::new(server.url());
        assert_eq!(
            gw.me(&token()).await.unwrap_err(),
            ApiError::Unauthorized { status: 401 }
        );
        assert_eq!(
            gw.create_message(&token(), "x").await.unwrap_err(),
            ApiError::Validation {
                message: "The message field is required.".into()
            }
        );
    }

    #[tokio::test]
    async fn create_and_list_messages() {
        let mut server = mockito::Server::new_async().await;
        let create = server
            .mock("POST", "/chat/messages")
            .match_body(Matcher::Json(serde_json::json!({ "message": "hello" })))
            .with_status(201)
            .with_body(
                r#"{"message":{"id":77,"message":"hello","created_at":"2025-03-01T09:00:00Z","user":{"id":5,"name":"Ana"}}}"#,
            )
            .create_async()
            .await;
        server
            .mock("GET", "/chat/messages")
            .with_status(200)
            .with_body(
                r#"{"messages":[{"id":1,"message":"a","created_at":"2025-03-01T08:00:00Z","seen_at":"2025-03-01T08:05:00Z","user":{"id":2}}]}"#,
            )
            .create_async()
            .await;

        let gw = HttpGateway::new(server.url());
        let created = gw.create_message(&token(), "hello").await.unwrap();
        create.assert_async().await;
        assert_eq!(created.server_id(), Some("77"));

        let listed = gw.list_messages(&token()).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert!(listed[0].seen_at.is_some());
    }

    #[tokio::test]
    async fn typing_and_passthrough() {
        let mut server = mockito::Server::new_async().await;
        let typing = server
            .mock("POST", "/chat/typing")
            .match_body(Matcher::Json(serde_json::json!({ "typing": true })))
            .with_status(204)
            .create_async()
            .await;
        server
            .mock("GET", "/attendance/today")
            .with_status(200)
            .with_body(r#"{"status":"present"}"#)
            .create_async()
            .await;

        let gw = HttpGateway::new(server.url());
        gw.send_typing(&token(), true).await.unwrap();
        typing.assert_async().await;

        let value = gw
            .request_json(&token(), Method::GET, "attendance/today", None)
            .await
            .unwrap();
        assert_eq!(value["status"], "present");
    }

    #[tokio::test]
    async fn unreachable_server_is_transport_error() {
        let gw = HttpGateway::new("http://127.0.0.1:1");
        let err = gw.mark_seen(&token()).await.unwrap_err();
        assert!(matches!(err, ApiError::Transport(_)));
    }
}
