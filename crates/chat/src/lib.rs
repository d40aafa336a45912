//! Chat message list kept in sync with the backend.
//!
//! [`MessageStore`] is the only writer of the list. It merges three sources:
//! optimistic local sends, REST responses and realtime events.

pub mod state;
pub mod store;

pub use {state::ChatState, store::MessageStore};
