use std::{sync::Arc, time::Duration};

use {
    anyhow::{Context, Result, bail},
    async_trait::async_trait,
    secrecy::SecretString,
    tidings_channels::{EventSink, PusherChannel, RealtimeChannel, RealtimeEvent, pump},
    tidings_chat::MessageStore,
    tidings_common::{AuthFailure, ClientError, Message},
    tidings_gateway::Method,
    tracing::info,
};

use crate::context::AppContext;

/// Grace period for the typing worker before the process exits.
const TYPING_FLUSH: Duration = Duration::from_millis(300);

fn print_message(message: &Message) {
    let seen = if message.seen_at.is_some() { " (seen)" } else { "" };
    println!(
        "[{}] {} {}: {}{seen}",
        message.id,
        message.created_at.format("%H:%M"),
        message.author_name,
        message.body
    );
}

fn credentials(ctx: &AppContext) -> Result<(SecretString, String)> {
    let session = ctx.session.snapshot();
    match (session.token, session.user_id) {
        (Some(token), Some(user_id)) if session.fetched => Ok((token, user_id)),
        _ => Err(AuthFailure::NotAuthenticated.into()),
    }
}

pub async fn messages(ctx: &AppContext) -> Result<()> {
    let count = ctx.surface(ctx.messages.fetch_messages().await)?;
    for message in ctx.messages.snapshot().await {
        print_message(&message);
    }
    info!(count, "listed messages");
    Ok(())
}

pub async fn send(ctx: &AppContext, text: &str) -> Result<()> {
    let message = ctx.surface(ctx.messages.send_message(text).await)?;
    print_message(&message);
    Ok(())
}

pub async fn seen(ctx: &AppContext) -> Result<()> {
    ctx.surface(ctx.messages.fetch_messages().await)?;
    let changed = ctx.messages.mark_as_seen().await;
    println!("{changed} message(s) marked as seen");
    Ok(())
}

pub async fn typing(ctx: &AppContext, state: &str) -> Result<()> {
    let typing = match state {
        "on" | "true" | "1" => true,
        "off" | "false" | "0" => false,
        other => bail!("expected on or off, got {other:?}"),
    };
    credentials(ctx)?;
    ctx.messages.send_typing(typing);
    tokio::time::sleep(TYPING_FLUSH).await;
    Ok(())
}

/// Forwards events to the store and echoes what changed.
struct Printer {
    store: Arc<MessageStore>,
}

#[async_trait]
impl EventSink for Printer {
    async fn on_event(&self, event: RealtimeEvent) {
        let echo = event.clone();
        if !self.store.apply_event(event).await {
            return;
        }
        match echo {
            RealtimeEvent::Created(message) => print_message(&message),
            RealtimeEvent::Typing(..) => {
                let typing = self.store.typing_users().await;
                if typing.is_empty() {
                    println!("nobody is typing");
                } else {
                    println!("typing: {}", typing.join(", "));
                }
            },
            RealtimeEvent::Seen(at) => println!("seen at {}", at.format("%H:%M:%S")),
        }
    }
}

pub async fn watch(ctx: &AppContext) -> Result<()> {
    let (token, user_id) = credentials(ctx)?;
    messages(ctx).await?;

    let topic = ctx.config.realtime.topic_for(&user_id);
    let channel = PusherChannel::new(ctx.config.realtime.clone());
    let subscription = channel
        .subscribe(&topic, &token)
        .await
        .with_context(|| format!("failed to subscribe to {topic}"))?;
    println!("watching {topic}, Ctrl-C to stop");

    let sink = Arc::new(Printer {
        store: Arc::clone(&ctx.messages),
    });
    tokio::select! {
        delivered = pump(subscription, sink) => {
            info!(delivered, "realtime connection closed");
        },
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted");
        },
    }
    Ok(())
}

pub async fn api(ctx: &AppContext, method: &str, path: &str, body: Option<&str>) -> Result<()> {
    let (token, _) = credentials(ctx)?;
    let method = Method::from_bytes(method.to_uppercase().as_bytes())
        .with_context(|| format!("invalid HTTP method {method}"))?;
    let body = body
        .map(serde_json::from_str)
        .transpose()
        .context("--body is not valid JSON")?;

    let result = ctx
        .gateway
        .request_json(&token, method, path, body)
        .await
        .map_err(ClientError::from);
    let value = ctx.surface(result)?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}
