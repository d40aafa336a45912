use {
    chrono::{DateTime, Utc},
    serde::Deserialize,
    serde_json::Value,
    tidings_common::{Message, types::RawId},
};

use crate::error::ChannelError;

pub const MESSAGE_CREATED: &str = "message-created";
pub const TYPING: &str = "typing";
pub const MESSAGE_SEEN: &str = "message-seen";

/// A push event for the session's chat topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RealtimeEvent {
    /// A confirmed message, keyed by its server id.
    Created(Message),
    /// `(is_typing, user_id)`
    Typing(bool, String),
    /// The counterpart has seen the conversation up to this instant.
    Seen(DateTime<Utc>),
}

#[derive(Deserialize)]
struct TypingPayload {
    #[serde(alias = "userId")]
    user_id: RawId,
    #[serde(alias = "is_typing", alias = "isTyping")]
    typing: bool,
}

#[derive(Deserialize)]
struct SeenPayload {
    #[serde(default, alias = "at")]
    seen_at: Option<DateTime<Utc>>,
}

/// Decode a broadcaster event. Unknown event names yield `Ok(None)`.
///
/// Names may carry Echo's leading `.`; a `message-created` payload may wrap
/// the message in a `message` field or be the message itself.
pub fn decode_event(name: &str, data: &Value) -> Result<Option<RealtimeEvent>, ChannelError> {
    let name = name.trim_start_matches('.');
    let decode_err = |e: serde_json::Error| ChannelError::Decode {
        event: name.to_string(),
        reason: e.to_string(),
    };

    let event = match name {
        MESSAGE_CREATED => {
            let body = match data.get("message") {
                Some(inner) if inner.is_object() => inner,
                _ => data,
            };
            RealtimeEvent::Created(Message::deserialize(body).map_err(decode_err)?)
        },
        TYPING => {
            let payload = TypingPayload::deserialize(data).map_err(decode_err)?;
            RealtimeEvent::Typing(payload.typing, payload.user_id.into())
        },
        MESSAGE_SEEN => {
            let payload = if data.is_null() {
                SeenPayload { seen_at: None }
            } else {
                SeenPayload::deserialize(data).map_err(decode_err)?
            };
            RealtimeEvent::Seen(payload.seen_at.unwrap_or_else(Utc::now))
        },
        _ => return Ok(None),
    };
    Ok(Some(event))
}

#[cfg(test)]
mod tests {
    use {super::*, serde_json::json};

    #[test]
    fn decodes_wrapped_and_bare_messages() {
        let wrapped = json!({"message": {
            "id": 10, "message": "hi", "created_at": "2025-03-01T10:00:00Z",
            "user": {"id": 2, "name": "Bo"}
        }});
        let Some(RealtimeEvent::Created(msg)) = decode_event(".message-created", &wrapped).unwrap()
        else {
            panic!("expected created event");
        };
        assert_eq!(msg.server_id(), Some("10"));
        assert_eq!(msg.author_name, "Bo");

        let bare = json!({"id": "11", "message": "yo", "created_at": "2025-03-01T10:00:00Z"});
        let event = decode_event("message-created", &bare).unwrap().unwrap();
        assert!(matches!(event, RealtimeEvent::Created(m) if m.server_id() == Some("11")));
    }

    #[test]
    fn decodes_typing_and_seen() {
        let typing = decode_event("typing", &json!({"user_id": 4, "typing": true}))
            .unwrap()
            .unwrap();
        assert_eq!(typing, RealtimeEvent::Typing(true, "4".into()));

        let seen = decode_event(
            ".message-seen",
            &json!({"seen_at": "2025-03-01T11:00:00Z"}),
        )
        .unwrap()
        .unwrap();
        let RealtimeEvent::Seen(at) = seen else {
            panic!("expected seen event");
        };
        assert_eq!(at.to_rfc3339(), "2025-03-01T11:00:00+00:00");

        assert!(matches!(
            decode_event("message-seen", &Value::Null).unwrap(),
            Some(RealtimeEvent::Seen(_))
        ));
    }

    #[test]
    fn ignores_unknown_and_rejects_malformed() {
        assert!(decode_event("presence-joined", &json!({})).unwrap().is_none());
        let err = decode_event("message-created", &json!({"id": 1})).unwrap_err();
        assert!(matches!(err, ChannelError::Decode { event, .. } if event == "message-created"));
    }
}
