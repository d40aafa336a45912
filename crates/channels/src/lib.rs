//! Real-time channel plumbing.
//!
//! A [`RealtimeChannel`] adapter turns a broadcaster topic into a
//! [`Subscription`] of typed [`RealtimeEvent`]s. Consumers implement
//! [`EventSink`] and are fed by [`pump`].

pub mod channel;
pub mod error;
pub mod event;
pub mod pusher;

pub use {
    channel::{EventSink, RealtimeChannel, Subscription, pump},
    error::ChannelError,
    event::{RealtimeEvent, decode_event},
    pusher::PusherChannel,
};
