#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("connect failed: {0}")]
    Connect(String),

    #[error("subscription authorization failed: {0}")]
    Authorize(String),

    #[error("broadcaster protocol error: {0}")]
    Protocol(String),

    #[error("timed out waiting for {0}")]
    Timeout(&'static str),

    #[error("undecodable {event} payload: {reason}")]
    Decode { event: String, reason: String },
}
