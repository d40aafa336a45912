//! Pusher-protocol websocket adapter (Laravel Reverb, Soketi, Pusher).
//!
//! Handshake:
//! 1. connect to `{ws_url}/app/{app_key}?protocol=7`
//! 2. read `pusher:connection_established` for the socket id
//! 3. for `private-`/`presence-` topics, POST `socket_id` + `channel_name` to
//!    the authorization endpoint with the bearer token
//! 4. send `pusher:subscribe` with the returned signature
//!
//! After that a reader task answers pings and forwards decoded events.

use std::time::Duration;

use {
    async_trait::async_trait,
    futures::{SinkExt, StreamExt},
    secrecy::{ExposeSecret, SecretString},
    serde::{Deserialize, Serialize},
    serde_json::{Value, json},
    tidings_config::RealtimeConfig,
    tokio::{net::TcpStream, sync::mpsc},
    tokio_tungstenite::{
        MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message as WsMessage,
    },
    tracing::{debug, info, trace, warn},
};

use crate::{
    channel::{RealtimeChannel, Subscription},
    error::ChannelError,
    event::{RealtimeEvent, decode_event},
};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

const PROTOCOL_VERSION: u8 = 7;
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
const EVENT_BUFFER: usize = 64;

/// One protocol frame. `data` is usually a JSON document encoded as a string.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Frame {
    event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    channel: Option<String>,
    #[serde(default)]
    data: Value,
}

impl Frame {
    fn new(event: &str, data: Value) -> Self {
        Self {
            event: event.into(),
            channel: None,
            data,
        }
    }

    /// The payload with string-encoded JSON unwrapped.
    fn payload(&self) -> Value {
        match &self.data {
            Value::String(raw) => {
                serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.clone()))
            },
            other => other.clone(),
        }
    }

    fn to_ws(&self) -> Result<WsMessage, ChannelError> {
        serde_json::to_string(self)
            .map(WsMessage::text)
            .map_err(|e| ChannelError::Protocol(e.to_string()))
    }
}

#[derive(Deserialize)]
struct ConnectionEstablished {
    socket_id: String,
}

#[derive(Deserialize)]
struct AuthSignature {
    auth: String,
}

/// [`RealtimeChannel`] speaking the Pusher websocket protocol.
pub struct PusherChannel {
    config: RealtimeConfig,
    http: reqwest::Client,
}

impl PusherChannel {
    pub fn new(config: RealtimeConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    fn socket_url(&self) -> String {
        format!(
            "{}/app/{}?protocol={PROTOCOL_VERSION}&client=tidings&version={}",
            self.config.ws_url.trim_end_matches('/'),
            self.config.app_key,
            env!("CARGO_PKG_VERSION"),
        )
    }

    async fn authorize(
        &self,
        socket_id: &str,
        channel: &str,
        token: &SecretString,
    ) -> Result<String, ChannelError> {
        let resp = self
            .http
            .post(&self.config.auth_endpoint)
            .bearer_auth(token.expose_secret())
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&[("socket_id", socket_id), ("channel_name", channel)])
            .send()
            .await
            .map_err(|e| ChannelError::Authorize(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ChannelError::Authorize(format!(
                "broadcaster auth endpoint returned HTTP {}",
                status.as_u16()
            )));
        }

        resp.json::<AuthSignature>()
            .await
            .map(|sig| sig.auth)
            .map_err(|e| ChannelError::Authorize(e.to_string()))
    }
}

fn needs_authorization(topic: &str) -> bool {
    topic.starts_with("private-") || topic.starts_with("presence-")
}

async fn read_frame(socket: &mut Socket) -> Result<Option<Frame>, ChannelError> {
    while let Some(msg) = socket.next().await {
        match msg.map_err(|e| ChannelError::Protocol(e.to_string()))? {
            WsMessage::Text(text) => {
                trace!(raw = %text.as_str(), "broadcaster -> client");
                match serde_json::from_str(text.as_str()) {
                    Ok(frame) => return Ok(Some(frame)),
                    Err(e) => warn!(error = %e, "skipping malformed frame"),
                }
            },
            WsMessage::Close(_) => return Ok(None),
            _ => continue,
        }
    }
    Ok(None)
}

async fn await_socket_id(socket: &mut Socket) -> Result<String, ChannelError> {
    loop {
        let frame = read_frame(socket)
            .await?
            .ok_or_else(|| ChannelError::Connect("closed during handshake".into()))?;
        match frame.event.as_str() {
            "pusher:connection_established" => {
                let established: ConnectionEstablished =
                    serde_json::from_value(frame.payload())
                        .map_err(|e| ChannelError::Protocol(e.to_string()))?;
                return Ok(established.socket_id);
            },
            "pusher:error" => {
                return Err(ChannelError::Connect(frame.payload().to_string()));
            },
            other => debug!(event = other, "ignoring frame before handshake"),
        }
    }
}

/// Reader loop: answer pings, forward topic events, stop when the socket
/// closes or the subscription is dropped.
async fn run_reader(mut socket: Socket, topic: String, tx: mpsc::Sender<RealtimeEvent>) {
    loop {
        let frame = match read_frame(&mut socket).await {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(e) => {
                warn!(topic = %topic, error = %e, "broadcaster stream failed");
                break;
            },
        };

        match frame.event.as_str() {
            "pusher:ping" => {
                let pong = Frame::new("pusher:pong", json!({})).to_ws();
                if let Ok(pong) = pong
                    && socket.send(pong).await.is_err()
                {
                    break;
                }
            },
            "pusher_internal:subscription_succeeded" => {
                info!(topic = %topic, "subscribed");
            },
            "pusher:error" => {
                warn!(topic = %topic, payload = %frame.payload(), "broadcaster error");
            },
            name if frame.channel.as_deref() == Some(topic.as_str()) => {
                match decode_event(name, &frame.payload()) {
                    Ok(Some(event)) => {
                        if tx.send(event).await.is_err() {
                            break;
                        }
                    },
                    Ok(None) => trace!(event = name, "ignoring unknown event"),
                    Err(e) => warn!(error = %e, "dropping undecodable event"),
                }
            },
            other => trace!(event = other, "ignoring frame"),
        }
    }

    let _ = socket.close(None).await;
    debug!(topic = %topic, "broadcaster reader stopped");
}

#[async_trait]
impl RealtimeChannel for PusherChannel {
    async fn subscribe(
        &self,
        topic: &str,
        token: &SecretString,
    ) -> Result<Subscription, ChannelError> {
        let url = self.socket_url();
        let (mut socket, _) = tokio::time::timeout(HANDSHAKE_TIMEOUT, connect_async(url.as_str()))
            .await
            .map_err(|_| ChannelError::Timeout("broadcaster connection"))?
            .map_err(|e| ChannelError::Connect(e.to_string()))?;

        let socket_id = tokio::time::timeout(HANDSHAKE_TIMEOUT, await_socket_id(&mut socket))
            .await
            .map_err(|_| ChannelError::Timeout("connection_established"))??;
        debug!(socket_id = %socket_id, "broadcaster connection established");

        let mut data = json!({ "channel": topic });
        if needs_authorization(topic) {
            data["auth"] = Value::String(self.authorize(&socket_id, topic, token).await?);
        }
        socket
            .send(Frame::new("pusher:subscribe", data).to_ws()?)
            .await
            .map_err(|e| ChannelError::Protocol(e.to_string()))?;

        let (tx, subscription) = Subscription::channel(topic, EVENT_BUFFER);
        let reader = tokio::spawn(run_reader(socket, topic.to_string(), tx));
        Ok(subscription.with_reader(reader))
    }
}
