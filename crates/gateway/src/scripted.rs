//! In-memory [`ApiGateway`] driven by queued responses.

use std::{
    collections::VecDeque,
    sync::{Mutex, MutexGuard, PoisonError},
};

use {
    async_trait::async_trait,
    secrecy::SecretString,
    tidings_common::Message,
    tokio::sync::oneshot,
};

use crate::{
    ApiGateway, Method,
    error::{ApiError, ApiResult},
    types::{AuthResponse, LoginRequest, ProfileResponse, RegisterRequest},
};

/// A call observed by the scripted gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Login { email: String },
    Register { email: String },
    Me,
    ListMessages,
    CreateMessage { body: String },
    MarkSeen,
    Typing(bool),
    Request { method: String, path: String },
}

enum CreateReply {
    Ready(ApiResult<Message>),
    Gated(oneshot::Receiver<ApiResult<Message>>),
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn unscripted(what: &str) -> ApiError {
    ApiError::Transport(format!("no scripted response for {what}"))
}

/// Responses are consumed in FIFO order per endpoint. An endpoint with no
/// queued response fails with a transport error, except the two
/// acknowledgement endpoints (`seen`, `typing`) which succeed by default.
#[derive(Default)]
pub struct ScriptedGateway {
    login: Mutex<VecDeque<ApiResult<AuthResponse>>>,
    register: Mutex<VecDeque<ApiResult<AuthResponse>>>,
    me: Mutex<VecDeque<ApiResult<ProfileResponse>>>,
    messages: Mutex<VecDeque<ApiResult<Vec<Message>>>>,
    create: Mutex<VecDeque<CreateReply>>,
    seen: Mutex<VecDeque<ApiResult<()>>>,
    typing: Mutex<VecDeque<ApiResult<()>>>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_login(&self, reply: ApiResult<AuthResponse>) {
        lock(&self.login).push_back(reply);
    }

    pub fn push_register(&self, reply: ApiResult<AuthResponse>) {
        lock(&self.register).push_back(reply);
    }

    pub fn push_me(&self, reply: ApiResult<ProfileResponse>) {
        lock(&self.me).push_back(reply);
    }

    pub fn push_messages(&self, reply: ApiResult<Vec<Message>>) {
        lock(&self.messages).push_back(reply);
    }

    pub fn push_create(&self, reply: ApiResult<Message>) {
        lock(&self.create).push_back(CreateReply::Ready(reply));
    }

    /// Queue a create response that resolves only when the returned sender
    /// fires (or fails with a transport error if the sender is dropped).
    pub fn gate_create(&self) -> oneshot::Sender<ApiResult<Message>> {
        let (tx, rx) = oneshot::channel();
        lock(&self.create).push_back(CreateReply::Gated(rx));
        tx
    }

    pub fn push_seen(&self, reply: ApiResult<()>) {
        lock(&self.seen).push_back(reply);
    }

    pub fn push_typing(&self, reply: ApiResult<()>) {
        lock(&self.typing).push_back(reply);
    }

    pub fn calls(&self) -> Vec<Call> {
        lock(&self.calls).clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        lock(&self.calls).iter().filter(|c| pred(c)).count()
    }

    fn record(&self, call: Call) {
        lock(&self.calls).push(call);
    }
}

#[async_trait]
impl ApiGateway for ScriptedGateway {
    async fn login(&self, req: &LoginRequest) -> ApiResult<AuthResponse> {
        self.record(Call::Login {
            email: req.email.clone(),
        });
        lock(&self.login)
            .pop_front()
            .unwrap_or_else(|| Err(unscripted("login")))
    }

    async fn register(&self, req: &RegisterRequest) -> ApiResult<AuthResponse> {
        self.record(Call::Register {
            email: req.email.clone(),
        });
        lock(&self.register)
            .pop_front()
            .unwrap_or_else(|| Err(unscripted("register")))
    }

    async fn me(&self, _token: &SecretString) -> ApiResult<ProfileResponse> {
        self.record(Call::Me);
        lock(&self.me)
            .pop_front()
            .unwrap_or_else(|| Err(unscripted("me")))
    }

    async fn list_messages(&self, _token: &SecretString) -> ApiResult<Vec<Message>> {
        self.record(Call::ListMessages);
        lock(&self.messages)
            .pop_front()
            .unwrap_or_else(|| Err(unscripted("list_messages")))
    }

    async fn create_message(&self, _token: &SecretString, body: &str) -> ApiResult<Message> {
        self.record(Call::CreateMessage { body: body.into() });
        let reply = lock(&self.create).pop_front();
        match reply {
            Some(CreateReply::Ready(result)) => result,
            Some(CreateReply::Gated(rx)) => rx
                .await
                .unwrap_or_else(|_| Err(ApiError::Transport("gate dropped".into()))),
            None => Err(unscripted("create_message")),
        }
    }

    async fn mark_seen(&self, _token: &SecretString) -> ApiResult<()> {
        self.record(Call::MarkSeen);
        lock(&self.seen).pop_front().unwrap_or(Ok(()))
    }

    async fn send_typing(&self, _token: &SecretString, typing: bool) -> ApiResult<()> {
        self.record(Call::Typing(typing));
        lock(&self.typing).pop_front().unwrap_or(Ok(()))
    }

    async fn request_json(
        &self,
        _token: &SecretString,
        method: Method,
        path: &str,
        _body: Option<serde_json::Value>,
    ) -> ApiResult<serde_json::Value> {
        self.record(Call::Request {
            method: method.to_string(),
            path: path.into(),
        });
        Ok(serde_json::Value::Null)
    }
}
