//! Shared data model and error taxonomy for the tidings client.
//!
//! Everything that more than one crate needs to agree on lives here: the
//! session record, the capability set, chat messages and the errors that
//! cross crate boundaries.

pub mod error;
pub mod session;
pub mod types;

pub use {
    error::{AuthFailure, ClientError},
    session::{CapabilitySet, Session, SessionState},
    types::{LocalId, Message, MessageId, UserPayload, WireMessage},
};
